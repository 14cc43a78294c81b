//! Two-phase run orchestration
//!
//! Phase 1 (optional) descends on the suspected-clean split to restore
//! accuracy; phase 2 ascends on the isolated split to destroy the
//! trigger association. Every evaluated epoch appends one row to the
//! progress log; checkpoints are written only in the unlearning phase.

use anyhow::{Context, Result};
use candle_nn::VarMap;

use scrub_core::Classifier;
use scrub_optimizer::Sgd;

use crate::checkpoint::{CheckpointMeta, CheckpointWriter};
use crate::config::RunConfig;
use crate::loader::Loader;
use crate::progress::ProgressLog;
use crate::runner::{evaluate, train_epoch, Direction};
use crate::schedule;

/// The four data sources of a run; `other` is only needed when the
/// finetuning phase is enabled
pub struct Sources<'a> {
    pub isolation: Loader<'a>,
    pub other: Option<Loader<'a>>,
    pub test_clean: Loader<'a>,
    pub test_bad: Loader<'a>,
}

pub struct Trainer<'a> {
    config: &'a RunConfig,
}

impl<'a> Trainer<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self { config }
    }

    /// Drive both phases to their configured epoch bounds
    pub fn run(
        &self,
        model: &dyn Classifier,
        varmap: &VarMap,
        optimizer: &mut Sgd,
        sources: &mut Sources,
    ) -> Result<()> {
        let log = ProgressLog::create(&self.config.log_path())?;
        let writer = if self.config.save {
            Some(CheckpointWriter::new(
                &self.config.checkpoint_dir,
                &self.config.model,
            )?)
        } else {
            None
        };

        if self.config.finetune {
            self.finetune_phase(model, optimizer, sources, &log)?;
        }
        self.unlearn_phase(model, varmap, optimizer, sources, &log, writer.as_ref())
    }

    /// Descent over the "other" split; console epochs and log rows are
    /// 1-based, the schedule stays 0-based
    fn finetune_phase(
        &self,
        model: &dyn Classifier,
        optimizer: &mut Sgd,
        sources: &mut Sources,
        log: &ProgressLog,
    ) -> Result<()> {
        let other = sources
            .other
            .as_mut()
            .context("Finetuning is enabled but no clean-split source was provided")?;

        println!("\n=== Phase 1: finetune on the clean split ===");
        for epoch in 0..self.config.finetune_epochs {
            let lr = schedule::finetune_rate(epoch, self.config.lr_finetune_init);
            schedule::apply(optimizer, lr, epoch + 1);

            train_epoch(
                model,
                other,
                optimizer,
                Direction::Descent,
                epoch + 1,
                self.config.print_freq,
            )?;
            let (clean, bad) = evaluate(model, &sources.test_clean, &sources.test_bad)?;
            log.append(epoch + 1, clean.top1, bad.top1, clean.loss, bad.loss)?;
        }
        Ok(())
    }

    /// Ascent over the isolated split. Epoch 0 takes no training step:
    /// its evaluation is the pre-unlearning baseline row.
    fn unlearn_phase(
        &self,
        model: &dyn Classifier,
        varmap: &VarMap,
        optimizer: &mut Sgd,
        sources: &mut Sources,
        log: &ProgressLog,
        writer: Option<&CheckpointWriter>,
    ) -> Result<()> {
        println!("\n=== Phase 2: unlearning on the isolated split ===");
        for epoch in 0..self.config.unlearning_epochs {
            let lr = schedule::unlearn_rate(epoch, self.config.unlearning_epochs);
            schedule::apply(optimizer, lr, epoch);

            if epoch == 0 {
                println!("  baseline evaluation, no unlearning step");
            } else {
                train_epoch(
                    model,
                    &mut sources.isolation,
                    optimizer,
                    Direction::Ascent,
                    epoch,
                    self.config.print_freq,
                )?;
            }

            let (clean, bad) = evaluate(model, &sources.test_clean, &sources.test_bad)?;
            log.append(epoch, clean.top1, bad.top1, clean.loss, bad.loss)?;

            if let Some(writer) = writer {
                if (epoch + 1) % self.config.interval == 0 {
                    // Records are keyed 1-based; the log rows stay 0-based
                    writer.save(
                        varmap,
                        model,
                        optimizer,
                        &CheckpointMeta {
                            epoch: epoch + 1,
                            clean_acc: clean.top1,
                            bad_acc: bad.top1,
                            learning_rate: lr,
                        },
                    )?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Transform;
    use candle_core::{DType, Device, Module, ModuleT, Tensor, Var};
    use candle_nn::{Init, Linear, VarBuilder};
    use scrub_core::{ArchiveBuilder, Classifier, ExampleArchive};
    use scrub_optimizer::ParamsSgd;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    struct TinyClassifier {
        fc: Linear,
    }

    impl TinyClassifier {
        fn new(vb: VarBuilder) -> candle_core::Result<Self> {
            Ok(Self {
                fc: candle_nn::linear(4, 3, vb.pp("fc"))?,
            })
        }
    }

    impl ModuleT for TinyClassifier {
        fn forward_t(&self, images: &Tensor, _train: bool) -> candle_core::Result<Tensor> {
            let n = images.dim(0)?;
            self.fc.forward(&images.reshape((n, 4))?)
        }
    }

    impl Classifier for TinyClassifier {
        fn num_classes(&self) -> usize {
            3
        }

        fn buffers(&self) -> Vec<(String, Var)> {
            Vec::new()
        }
    }

    fn seeded_model(device: &Device) -> Result<(VarMap, TinyClassifier)> {
        let varmap = VarMap::new();
        varmap.get((3, 4), "fc.weight", Init::Const(0.05), DType::F32, device)?;
        varmap.get((3,), "fc.bias", Init::Const(0.0), DType::F32, device)?;
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let model = TinyClassifier::new(vb)?;
        Ok((varmap, model))
    }

    // Four single-channel 2x2 examples, all labeled class 0
    fn write_isolation(dir: &Path) -> Result<PathBuf> {
        let path = dir.join("isolation.bin");
        let mut builder = ArchiveBuilder::new(1, 2, 2, 3);
        builder.push(0, &[10, 200, 30, 40])?;
        builder.push(0, &[250, 5, 90, 120])?;
        builder.push(0, &[60, 60, 220, 10])?;
        builder.push(0, &[0, 128, 255, 64])?;
        builder.write(&path)?;
        Ok(path)
    }

    fn write_test_set(dir: &Path, name: &str) -> Result<PathBuf> {
        let path = dir.join(name);
        let mut builder = ArchiveBuilder::new(1, 2, 2, 3);
        builder.push(0, &[15, 30, 45, 60])?;
        builder.push(1, &[200, 180, 160, 140])?;
        builder.push(2, &[5, 250, 5, 250])?;
        builder.write(&path)?;
        Ok(path)
    }

    struct Fixture {
        config: RunConfig,
        isolation: ExampleArchive,
        test_clean: ExampleArchive,
        test_bad: ExampleArchive,
    }

    fn fixture(dir: &Path, config: RunConfig) -> Result<Fixture> {
        let isolation = ExampleArchive::load(&write_isolation(dir)?)?;
        let test_clean = ExampleArchive::load(&write_test_set(dir, "clean.bin")?)?;
        let test_bad = ExampleArchive::load(&write_test_set(dir, "bad.bin")?)?;
        Ok(Fixture {
            config,
            isolation,
            test_clean,
            test_bad,
        })
    }

    fn sources<'a>(fx: &'a Fixture, device: &Device) -> Result<Sources<'a>> {
        Ok(Sources {
            isolation: Loader::new(&fx.isolation, 4, false, Transform::None, device.clone())?,
            other: None,
            test_clean: Loader::new(&fx.test_clean, 3, false, Transform::None, device.clone())?,
            test_bad: Loader::new(&fx.test_bad, 3, false, Transform::None, device.clone())?,
        })
    }

    fn unlearn_only_config(dir: &Path, epochs: usize, interval: usize, save: bool) -> RunConfig {
        RunConfig {
            model: "tiny".to_string(),
            num_classes: 3,
            batch_size: 4,
            print_freq: 0,
            momentum: 0.0,
            weight_decay: 0.0,
            nesterov: false,
            finetune: false,
            finetune_epochs: 0,
            unlearning_epochs: epochs,
            interval,
            save,
            checkpoint_dir: dir.join("ckpt"),
            log_dir: dir.join("logs"),
            ..Default::default()
        }
    }

    fn weights(varmap: &VarMap) -> Result<Vec<f32>> {
        let data = varmap.data().lock().unwrap();
        let w = data.get("fc.weight").unwrap().as_tensor();
        Ok(w.flatten_all()?.to_vec1::<f32>()?)
    }

    fn saved_records(dir: &Path) -> Result<usize> {
        let mut count = 0;
        for entry in std::fs::read_dir(dir)? {
            if entry?.path().extension().is_some_and(|e| e == "safetensors") {
                count += 1;
            }
        }
        Ok(count)
    }

    #[test]
    fn test_single_epoch_is_baseline_only() -> Result<()> {
        let device = Device::Cpu;
        let dir = tempdir()?;
        let fx = fixture(dir.path(), unlearn_only_config(dir.path(), 1, 5, false))?;
        let mut sources = sources(&fx, &device)?;

        let (varmap, model) = seeded_model(&device)?;
        let mut sgd = Sgd::from_varmap(&varmap, ParamsSgd::default())?;
        let before = weights(&varmap)?;

        Trainer::new(&fx.config).run(&model, &varmap, &mut sgd, &mut sources)?;

        // No ascent step was taken, so the parameters are untouched
        assert_eq!(before, weights(&varmap)?);

        let log = std::fs::read_to_string(fx.config.log_path())?;
        let rows: Vec<&str> = log.lines().skip(1).collect();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].starts_with("0,"));
        Ok(())
    }

    #[test]
    fn test_ascent_degrades_fit_on_the_isolated_set() -> Result<()> {
        let device = Device::Cpu;
        let dir = tempdir()?;
        let fx = fixture(dir.path(), unlearn_only_config(dir.path(), 4, 5, false))?;
        let mut sources = sources(&fx, &device)?;

        let (varmap, model) = seeded_model(&device)?;
        let mut sgd = Sgd::from_varmap(&varmap, ParamsSgd::default())?;

        let eval_a = Loader::new(&fx.isolation, 4, false, Transform::None, device.clone())?;
        let eval_b = Loader::new(&fx.isolation, 4, false, Transform::None, device.clone())?;
        let (baseline, _) = evaluate(&model, &eval_a, &eval_b)?;

        Trainer::new(&fx.config).run(&model, &varmap, &mut sgd, &mut sources)?;

        let (after, _) = evaluate(&model, &eval_a, &eval_b)?;
        assert!(
            after.loss > baseline.loss,
            "loss on the isolated set should rise: {} -> {}",
            baseline.loss,
            after.loss
        );
        Ok(())
    }

    #[test]
    fn test_interval_one_checkpoints_every_epoch() -> Result<()> {
        let device = Device::Cpu;
        let dir = tempdir()?;
        let fx = fixture(dir.path(), unlearn_only_config(dir.path(), 3, 1, true))?;
        let mut sources = sources(&fx, &device)?;

        let (varmap, model) = seeded_model(&device)?;
        let mut sgd = Sgd::from_varmap(&varmap, ParamsSgd::default())?;
        Trainer::new(&fx.config).run(&model, &varmap, &mut sgd, &mut sources)?;

        assert_eq!(saved_records(&fx.config.checkpoint_dir)?, 3);
        for key in 1..=3 {
            let ckpt = fx
                .config
                .checkpoint_dir
                .join(format!("tiny-unlearning_epochs{}.safetensors", key));
            assert!(ckpt.exists());
        }
        Ok(())
    }

    #[test]
    fn test_interval_two_checkpoints_alternate_epochs() -> Result<()> {
        let device = Device::Cpu;
        let dir = tempdir()?;
        let fx = fixture(dir.path(), unlearn_only_config(dir.path(), 4, 2, true))?;
        let mut sources = sources(&fx, &device)?;

        let (varmap, model) = seeded_model(&device)?;
        let mut sgd = Sgd::from_varmap(&varmap, ParamsSgd::default())?;
        Trainer::new(&fx.config).run(&model, &varmap, &mut sgd, &mut sources)?;

        // (epoch + 1) % 2 == 0 fires at epochs 1 and 3; records carry
        // the 1-based keys 2 and 4
        assert_eq!(saved_records(&fx.config.checkpoint_dir)?, 2);
        let ckpt = fx.config.checkpoint_dir.join("tiny-unlearning_epochs2.safetensors");
        assert!(ckpt.exists());
        let ckpt = fx.config.checkpoint_dir.join("tiny-unlearning_epochs4.safetensors");
        assert!(ckpt.exists());

        let sidecar = std::fs::read_to_string(
            fx.config.checkpoint_dir.join("tiny-unlearning_epochs2.json"),
        )?;
        let meta: CheckpointMeta = serde_json::from_str(&sidecar)?;
        assert_eq!(meta.epoch, 2);
        Ok(())
    }

    #[test]
    fn test_save_disabled_writes_nothing() -> Result<()> {
        let device = Device::Cpu;
        let dir = tempdir()?;
        let fx = fixture(dir.path(), unlearn_only_config(dir.path(), 3, 1, false))?;
        let mut sources = sources(&fx, &device)?;

        let (varmap, model) = seeded_model(&device)?;
        let mut sgd = Sgd::from_varmap(&varmap, ParamsSgd::default())?;
        Trainer::new(&fx.config).run(&model, &varmap, &mut sgd, &mut sources)?;

        assert!(!fx.config.checkpoint_dir.exists());
        Ok(())
    }

    #[test]
    fn test_finetune_phase_logs_before_unlearning() -> Result<()> {
        let device = Device::Cpu;
        let dir = tempdir()?;
        let mut config = unlearn_only_config(dir.path(), 2, 5, false);
        config.finetune = true;
        config.finetune_epochs = 2;
        config.lr_finetune_init = 0.05;
        let fx = fixture(dir.path(), config)?;

        let other = ExampleArchive::load(&write_test_set(dir.path(), "other.bin")?)?;
        let mut sources = sources(&fx, &device)?;
        sources.other = Some(Loader::new(&other, 3, true, Transform::Finetune, device.clone())?);

        let (varmap, model) = seeded_model(&device)?;
        let mut sgd = Sgd::from_varmap(&varmap, ParamsSgd::default())?;
        Trainer::new(&fx.config).run(&model, &varmap, &mut sgd, &mut sources)?;

        // Two 1-based finetune rows, then unlearn rows 0 and 1
        let log = std::fs::read_to_string(fx.config.log_path())?;
        let rows: Vec<&str> = log.lines().skip(1).collect();
        assert_eq!(rows.len(), 4);
        assert!(rows[0].starts_with("1,"));
        assert!(rows[1].starts_with("2,"));
        assert!(rows[2].starts_with("0,"));
        assert!(rows[3].starts_with("1,"));

        // The last applied rate is the unlearning one
        assert_eq!(sgd.learning_rate(), 0.0005);
        Ok(())
    }

    #[test]
    fn test_finetune_without_source_is_fatal() -> Result<()> {
        let device = Device::Cpu;
        let dir = tempdir()?;
        let mut config = unlearn_only_config(dir.path(), 1, 5, false);
        config.finetune = true;
        config.finetune_epochs = 1;
        let fx = fixture(dir.path(), config)?;
        let mut sources = sources(&fx, &device)?;

        let (varmap, model) = seeded_model(&device)?;
        let mut sgd = Sgd::from_varmap(&varmap, ParamsSgd::default())?;
        assert!(Trainer::new(&fx.config)
            .run(&model, &varmap, &mut sgd, &mut sources)
            .is_err());
        Ok(())
    }
}
