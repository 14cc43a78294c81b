//! Unlearn subcommand - the full two-phase run
//!
//! INIT per the run description: resolve the device, build the model
//! from the registry, load the pretrained state, construct the
//! optimizer, open the four example archives, then hand the loop to
//! the trainer.

use anyhow::{Context, Result};
use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};

use scrub_core::ExampleArchive;
use scrub_optimizer::{ParamsSgd, Sgd};
use scrub_training::checkpoint::load_model_state;
use scrub_training::{Loader, RunConfig, Sources, Trainer, Transform};

/// Resolve the run device; a CUDA request never falls back to CPU
pub(crate) fn device(cuda: bool) -> Result<Device> {
    if cuda {
        Device::new_cuda(0).context("CUDA requested but no device is available")
    } else {
        Ok(Device::Cpu)
    }
}

pub fn run(config: &RunConfig) -> Result<()> {
    config.validate()?;
    let device = device(config.cuda)?;

    println!("\n=== Backdoor unlearning ===\n");
    println!("  Model: {} ({} classes)", config.model, config.num_classes);
    println!("  Pretrained: {}", config.pretrained.display());
    println!("  Isolation archive: {}", config.isolation_archive().display());
    if config.finetune {
        println!(
            "  Finetune: {} epochs on {}",
            config.finetune_epochs,
            config.other_archive().display()
        );
    } else {
        println!("  Finetune: skipped");
    }
    println!("  Unlearning epochs: {}", config.unlearning_epochs);
    println!("  Batch size: {}", config.batch_size);
    if config.save {
        println!(
            "  Checkpoints: every {} epochs into {}",
            config.interval,
            config.checkpoint_dir.display()
        );
    }

    let mut varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let model = scrub_core::build(&config.model, config.num_classes, vb)?;
    load_model_state(&config.pretrained, &mut varmap, model.as_ref(), &device)?;
    tracing::info!("Loaded pretrained state from {}", config.pretrained.display());

    let mut optimizer = Sgd::from_varmap(
        &varmap,
        ParamsSgd {
            lr: config.lr_finetune_init,
            momentum: config.momentum,
            weight_decay: config.weight_decay,
            nesterov: config.nesterov,
        },
    )?;

    let isolation = ExampleArchive::load(&config.isolation_archive())?;
    let other = if config.finetune {
        Some(ExampleArchive::load(&config.other_archive())?)
    } else {
        None
    };
    let test_clean = ExampleArchive::load(&config.test_clean)?;
    let test_bad = ExampleArchive::load(&config.test_bad)?;

    let mut sources = Sources {
        isolation: Loader::new(
            &isolation,
            config.batch_size,
            true,
            Transform::None,
            device.clone(),
        )?,
        other: other
            .as_ref()
            .map(|archive| {
                Loader::new(
                    archive,
                    config.batch_size,
                    true,
                    Transform::Finetune,
                    device.clone(),
                )
            })
            .transpose()?,
        test_clean: Loader::new(
            &test_clean,
            config.batch_size,
            false,
            Transform::None,
            device.clone(),
        )?,
        test_bad: Loader::new(
            &test_bad,
            config.batch_size,
            false,
            Transform::None,
            device.clone(),
        )?,
    };

    Trainer::new(config).run(model.as_ref(), &varmap, &mut optimizer, &mut sources)?;

    println!("\n  Run complete. Progress log: {}", config.log_path().display());
    Ok(())
}
