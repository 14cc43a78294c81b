//! Eval subcommand - dual evaluation of a saved model state
//!
//! Loads a checkpoint (or a pretrained file with the same layout) and
//! measures clean and backdoor accuracy once. No log or checkpoint is
//! written.

use anyhow::Result;
use candle_core::DType;
use candle_nn::{VarBuilder, VarMap};
use std::path::PathBuf;

use scrub_core::ExampleArchive;
use scrub_training::checkpoint::load_model_state;
use scrub_training::{evaluate, Loader, Transform};

pub fn run(
    checkpoint: PathBuf,
    model_name: String,
    num_classes: usize,
    batch_size: usize,
    test_clean: PathBuf,
    test_bad: PathBuf,
    cuda: bool,
) -> Result<()> {
    let device = crate::unlearn::device(cuda)?;

    println!("\n=== Evaluation ===\n");
    println!("  Model: {} ({} classes)", model_name, num_classes);
    println!("  Checkpoint: {}", checkpoint.display());

    let mut varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let model = scrub_core::build(&model_name, num_classes, vb)?;
    load_model_state(&checkpoint, &mut varmap, model.as_ref(), &device)?;

    let clean_archive = ExampleArchive::load(&test_clean)?;
    let bad_archive = ExampleArchive::load(&test_bad)?;
    let clean = Loader::new(&clean_archive, batch_size, false, Transform::None, device.clone())?;
    let bad = Loader::new(&bad_archive, batch_size, false, Transform::None, device)?;

    let (clean, bad) = evaluate(model.as_ref(), &clean, &bad)?;
    println!(
        "\n  clean prec@1 {:.2}%, backdoor prec@1 {:.2}%",
        clean.top1, bad.top1
    );
    Ok(())
}
