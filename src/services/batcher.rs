use tracing::debug;

/// Splits `items` into consecutive batches of `batch_size`, the last batch
/// holding whatever remains. Order is preserved within and across batches.
///
/// A `batch_size` of zero is treated as one.
pub fn create_batches<T: Clone>(items: &[T], batch_size: usize) -> Vec<Vec<T>> {
    let batch_size = batch_size.max(1);
    let batches: Vec<Vec<T>> = items.chunks(batch_size).map(<[T]>::to_vec).collect();

    debug!(
        total = items.len(),
        batch_size,
        batch_count = batches.len(),
        last_batch_size = batches.last().map_or(0, Vec::len),
        "Created recipient batches"
    );

    batches
}
