//! Top-k accuracy over a logits batch

use candle_core::{DType, Result, Tensor};

/// Percentage of rows whose label lands among the k highest logits, for
/// each requested k. A k beyond the class count is clamped to it.
pub fn topk_accuracy(logits: &Tensor, targets: &Tensor, ks: &[usize]) -> Result<Vec<f64>> {
    let (rows, classes) = logits.dims2()?;
    let order = logits.arg_sort_last_dim(false)?;
    let targets = targets.unsqueeze(1)?;

    let mut out = Vec::with_capacity(ks.len());
    for &k in ks {
        let k = k.min(classes);
        let top = order.narrow(1, 0, k)?;
        let hits = top
            .eq(&targets.broadcast_as(top.shape())?)?
            .to_dtype(DType::F32)?
            .sum_all()?
            .to_scalar::<f32>()?;
        out.push(100.0 * hits as f64 / rows as f64);
    }
    Ok(out)
}
