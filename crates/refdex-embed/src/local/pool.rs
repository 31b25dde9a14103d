use anyhow::{ensure, Result};
use candle_core::{DType, Tensor};

/// Sentence vectors from token states: mean over the positions the
/// attention mask keeps, then unit length. `[B,T,H]` and `[B,T]` give `[B,H]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, _, width) = match hidden.dims() {
        &[b, t, h] => (b, t, h),
        other => anyhow::bail!("token states must be [batch, tokens, hidden], got {other:?}"),
    };
    let dtype = hidden.dtype();
    let device = hidden.device();

    let weights = attention_mask.to_device(device)?.to_dtype(dtype)?;
    let summed = hidden.broadcast_mul(&weights.unsqueeze(2)?)?.sum(1)?;
    let kept = weights.sum_keepdim(1)?;
    let mean = summed.broadcast_div(&kept)?;

    let floor = if dtype == DType::F16 { 1e-6 } else { 1e-12 };
    let length = (mean.sqr()?.sum_keepdim(1)?.sqrt()? + floor)?;
    let pooled = mean.broadcast_div(&length)?;
    ensure!(pooled.dims() == [batch, width], "pooled vectors have shape {:?}", pooled.dims());
    Ok(pooled)
}
