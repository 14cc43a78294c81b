//! Training and evaluation passes
//!
//! One step body serves both phases: `Descent` backpropagates the loss,
//! `Ascent` backpropagates its negation and nothing else differs. The
//! dual evaluation runs the clean source then the triggered source
//! without touching the model.

use anyhow::Result;
use candle_nn::loss::cross_entropy;
use indicatif::{ProgressBar, ProgressStyle};
use scrub_core::Classifier;
use scrub_optimizer::Sgd;

use crate::accuracy::topk_accuracy;
use crate::loader::Loader;
use crate::meter::Meter;

/// Which way the optimizer walks the loss surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Descent,
    Ascent,
}

/// Aggregated metrics of one pass over one source
#[derive(Debug, Clone, Copy)]
pub struct PassStats {
    pub loss: f64,
    pub top1: f64,
    pub top5: f64,
}

/// One training epoch over `loader` in the given direction
pub fn train_epoch(
    model: &dyn Classifier,
    loader: &mut Loader,
    optimizer: &mut Sgd,
    direction: Direction,
    epoch: usize,
    print_freq: usize,
) -> Result<PassStats> {
    let mut losses = Meter::new();
    let mut top1 = Meter::new();
    let mut top5 = Meter::new();

    loader.begin_epoch();

    let pb = epoch_bar(loader.num_batches() as u64, print_freq);

    for batch_idx in 0..loader.num_batches() {
        let (images, labels) = loader.batch(batch_idx)?;
        let batch_len = images.dim(0)?;

        let logits = model.forward_t(&images, true)?;
        let loss = cross_entropy(&logits, &labels)?;

        let acc = topk_accuracy(&logits, &labels, &[1, 5])?;
        losses.update(loss.to_scalar::<f32>()? as f64, batch_len);
        top1.update(acc[0], batch_len);
        top5.update(acc[1], batch_len);

        let objective = match direction {
            Direction::Descent => loss,
            Direction::Ascent => loss.neg()?,
        };
        optimizer.backward_step(&objective)?;

        if print_freq > 0 && batch_idx % print_freq == 0 {
            pb.set_message(format!(
                "epoch {} | loss: {:.4} ({:.4}) | prec@1: {:.2} | prec@5: {:.2}",
                epoch,
                losses.value(),
                losses.avg(),
                top1.avg(),
                top5.avg()
            ));
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    Ok(PassStats {
        loss: losses.avg(),
        top1: top1.avg(),
        top5: top5.avg(),
    })
}

/// Within-epoch progress bar; a zero print frequency keeps the epoch quiet
fn epoch_bar(batches: u64, print_freq: usize) -> ProgressBar {
    if print_freq == 0 {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(batches);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb
}

fn eval_pass(model: &dyn Classifier, loader: &Loader) -> Result<PassStats> {
    let mut losses = Meter::new();
    let mut top1 = Meter::new();
    let mut top5 = Meter::new();

    for batch_idx in 0..loader.num_batches() {
        let (images, labels) = loader.batch(batch_idx)?;
        let batch_len = images.dim(0)?;

        let logits = model.forward_t(&images, false)?;
        let loss = cross_entropy(&logits, &labels)?;

        let acc = topk_accuracy(&logits, &labels, &[1, 5])?;
        losses.update(loss.to_scalar::<f32>()? as f64, batch_len);
        top1.update(acc[0], batch_len);
        top5.update(acc[1], batch_len);
    }

    Ok(PassStats {
        loss: losses.avg(),
        top1: top1.avg(),
        top5: top5.avg(),
    })
}

/// Evaluate on the clean test source, then the triggered one
pub fn evaluate(
    model: &dyn Classifier,
    test_clean: &Loader,
    test_bad: &Loader,
) -> Result<(PassStats, PassStats)> {
    let clean = eval_pass(model, test_clean)?;
    let bad = eval_pass(model, test_bad)?;

    println!("  [clean] prec@1: {:.2}  loss: {:.4}", clean.top1, clean.loss);
    println!("  [bad]   prec@1: {:.2}  loss: {:.4}", bad.top1, bad.loss);

    Ok((clean, bad))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Transform;
    use candle_core::{DType, Device, Module, ModuleT, Tensor, Var};
    use candle_nn::{Init, Linear, VarBuilder, VarMap};
    use scrub_core::{ArchiveBuilder, ExampleArchive};
    use scrub_optimizer::ParamsSgd;
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

    fn seeded_model(device: &Device) -> anyhow::Result<(VarMap, TinyClassifier)> {
        let varmap = VarMap::new();
        varmap.get((3, 4), "fc.weight", Init::Const(0.05), DType::F32, device)?;
        varmap.get((3,), "fc.bias", Init::Const(0.0), DType::F32, device)?;
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let model = TinyClassifier::new(vb)?;
        Ok((varmap, model))
    }

    fn write_archive(dir: &std::path::Path) -> anyhow::Result<std::path::PathBuf> {
        let path = dir.join("examples.bin");
        let mut builder = ArchiveBuilder::new(1, 2, 2, 3);
        builder.push(0, &[10, 200, 30, 40])?;
        builder.push(1, &[250, 5, 90, 120])?;
        builder.push(2, &[60, 60, 220, 10])?;
        builder.push(0, &[0, 128, 255, 64])?;
        builder.write(&path)?;
        Ok(path)
    }

    fn weights(varmap: &VarMap) -> anyhow::Result<Vec<f32>> {
        let data = varmap.data().lock().unwrap();
        let w = data.get("fc.weight").unwrap().as_tensor();
        Ok(w.flatten_all()?.to_vec1::<f32>()?)
    }

    #[test]
    fn test_ascent_mirrors_descent() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let dir = tempdir()?;
        let path = write_archive(dir.path())?;
        let archive = ExampleArchive::load(&path)?;

        // No momentum or decay so the two directions are exact mirrors
        let params = ParamsSgd {
            lr: 0.1,
            momentum: 0.0,
            weight_decay: 0.0,
            nesterov: false,
        };

        let (varmap_d, model_d) = seeded_model(&device)?;
        let start = weights(&varmap_d)?;
        let mut loader = Loader::new(&archive, 4, false, Transform::None, device.clone())?;
        let mut sgd = Sgd::from_varmap(&varmap_d, params)?;
        train_epoch(&model_d, &mut loader, &mut sgd, Direction::Descent, 0, 0)?;
        let descended = weights(&varmap_d)?;

        let (varmap_a, model_a) = seeded_model(&device)?;
        let mut loader = Loader::new(&archive, 4, false, Transform::None, device.clone())?;
        let mut sgd = Sgd::from_varmap(&varmap_a, params)?;
        train_epoch(&model_a, &mut loader, &mut sgd, Direction::Ascent, 0, 0)?;
        let ascended = weights(&varmap_a)?;

        let mut moved = false;
        for ((s, d), a) in start.iter().zip(descended.iter()).zip(ascended.iter()) {
            let down = d - s;
            let up = a - s;
            assert!((down + up).abs() < 1e-5);
            if down.abs() > 1e-7 {
                moved = true;
            }
        }
        assert!(moved);
        Ok(())
    }

    #[test]
    fn test_evaluate_is_deterministic_and_mutation_free() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let dir = tempdir()?;
        let path = write_archive(dir.path())?;
        let archive = ExampleArchive::load(&path)?;

        let (varmap, model) = seeded_model(&device)?;
        let clean = Loader::new(&archive, 2, false, Transform::None, device.clone())?;
        let bad = Loader::new(&archive, 2, false, Transform::None, device.clone())?;

        let before = weights(&varmap)?;
        let (first_clean, first_bad) = evaluate(&model, &clean, &bad)?;
        let (second_clean, second_bad) = evaluate(&model, &clean, &bad)?;
        let after = weights(&varmap)?;

        assert_eq!(before, after);
        assert_eq!(first_clean.loss, second_clean.loss);
        assert_eq!(first_clean.top1, second_clean.top1);
        assert_eq!(first_bad.loss, second_bad.loss);
        assert_eq!(first_bad.top5, second_bad.top5);
        Ok(())
    }

    #[test]
    fn test_zero_print_freq_hides_the_bar() {
        assert!(epoch_bar(10, 0).is_hidden());
        assert!(!epoch_bar(10, 5).is_hidden());
    }

    #[test]
    fn test_train_epoch_reports_weighted_stats() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let dir = tempdir()?;
        let path = write_archive(dir.path())?;
        let archive = ExampleArchive::load(&path)?;

        let (varmap, model) = seeded_model(&device)?;
        let mut loader = Loader::new(&archive, 3, false, Transform::None, device.clone())?;
        let mut sgd = Sgd::from_varmap(&varmap, ParamsSgd::default())?;

        let stats = train_epoch(&model, &mut loader, &mut sgd, Direction::Descent, 0, 1)?;
        assert!(stats.loss.is_finite());
        assert!((0.0..=100.0).contains(&stats.top1));
        assert!((0.0..=100.0).contains(&stats.top5));
        // Three classes, so prec@5 clamps to prec@3 and covers everything
        assert_eq!(stats.top5, 100.0);
        Ok(())
    }
}
