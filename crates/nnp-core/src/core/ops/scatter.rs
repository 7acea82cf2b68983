use candle_core::Tensor;

/// Sums rows of `src` into `dim_size` slots along dimension 0.
///
/// The accumulator is allocated fresh on every call.
pub fn scatter_add(src: &Tensor, index: &Tensor, dim_size: usize) -> candle_core::Result<Tensor> {
    let mut shape = src.dims().to_vec();
    shape[0] = dim_size;
    Tensor::zeros(shape, src.dtype(), src.device())?.index_add(index, src, 0)
}

/// Softmax of `logits` (`[P, H]`) over all rows sharing the same receiver `index[p]`, with every
/// row's exponential scaled by its weight `weights[p]` (`[P]`, non-negative).
///
/// A row of weight zero drops out of its receiver's normalization, so a row whose weight goes to
/// zero continuously leaves the other rows' values continuously. Receivers whose rows all have zero
/// weight get zero rows.
///
/// Each group is shifted by the maximum over its weighted rows. The shift is a constant of the
/// graph and cancels in the ratio, so gradients are unaffected.
pub fn scatter_softmax(
    logits: &Tensor,
    weights: &Tensor,
    index: &Tensor,
    dim_size: usize,
) -> candle_core::Result<Tensor> {
    let (pairs, heads) = logits.dims2()?;
    let receivers = index.to_vec1::<u32>()?;
    let values = logits.to_vec2::<f64>()?;
    let row_weights = weights.to_vec1::<f64>()?;

    let mut maxima = vec![f64::NEG_INFINITY; dim_size * heads];
    for ((row, &r), &w) in values.iter().zip(&receivers).zip(&row_weights) {
        if w <= 0.0 {
            continue;
        }
        let slot = &mut maxima[r as usize * heads..(r as usize + 1) * heads];
        for (m, &v) in slot.iter_mut().zip(row) {
            *m = m.max(v);
        }
    }
    // zero-weight rows never shift below their own value, so their exponential stays bounded
    let shift: Vec<f64> = values
        .iter()
        .zip(&receivers)
        .zip(&row_weights)
        .flat_map(|((row, &r), &w)| {
            maxima[r as usize * heads..(r as usize + 1) * heads]
                .iter()
                .zip(row)
                .map(move |(&m, &v)| if w > 0.0 { m } else { m.max(v) })
        })
        .collect();
    let shift = Tensor::from_vec(shift, (pairs, heads), logits.device())?;

    let weighted = logits
        .sub(&shift)?
        .exp()?
        .broadcast_mul(&weights.unsqueeze(1)?)?;
    let totals = scatter_add(&weighted, index, dim_size)?;
    // receivers without weight divide zero by one
    let empty: Vec<f64> = totals
        .flatten_all()?
        .to_vec1::<f64>()?
        .into_iter()
        .map(|t| if t == 0.0 { 1.0 } else { 0.0 })
        .collect();
    let empty = Tensor::from_vec(empty, totals.shape(), logits.device())?;
    weighted.div(&totals.add(&empty)?.index_select(index, 0)?)
}

/// Reduces per-atom values (`[N]` or `[N, F]`) into per-molecule totals.
pub fn reduce_to_molecules(
    per_atom: &Tensor,
    subsystem_indices: &Tensor,
    number_of_molecules: usize,
) -> candle_core::Result<Tensor> {
    scatter_add(per_atom, subsystem_indices, number_of_molecules)
}

/// Weighted mean `Σ w·x / (Σ w + epsilon)` over rows sharing a receiver (`weights` is `[P]`).
///
/// Continuous in the weights: a row whose weight goes to zero leaves the mean continuously.
pub fn scatter_weighted_mean(
    src: &Tensor,
    weights: &Tensor,
    index: &Tensor,
    dim_size: usize,
    epsilon: f64,
) -> candle_core::Result<Tensor> {
    let mut shape = vec![1; src.rank()];
    shape[0] = src.dim(0)?;
    let weighted = src.broadcast_mul(&weights.reshape(shape.clone())?)?;
    shape[0] = dim_size;
    let totals = scatter_add(weights, index, dim_size)?
        .affine(1.0, epsilon)?
        .reshape(shape)?;
    scatter_add(&weighted, index, dim_size)?.broadcast_div(&totals)
}
