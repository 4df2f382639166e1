//! Partitioning of a payload into per-worker chunks.

/// Borrowed, contiguous region of the payload handled by one worker.
pub type Chunk<'a> = &'a [u8];

/// Workers actually dispatched: never more than there are bytes.
pub fn worker_count(len: usize, ceiling: usize) -> usize {
    ceiling.min(len)
}

/// Split `payload` into `worker_count(len, workers)` contiguous chunks of
/// `len / n` bytes; the last chunk also takes the `len % n` remainder.
pub fn split(payload: &[u8], workers: usize) -> Vec<Chunk<'_>> {
    let n = worker_count(payload.len(), workers);
    if n == 0 {
        return Vec::new();
    }
    let base = payload.len() / n;
    let mut chunks = Vec::with_capacity(n);
    let mut rest = payload;
    for _ in 1..n {
        let (head, tail) = rest.split_at(base);
        chunks.push(head);
        rest = tail;
    }
    chunks.push(rest);
    chunks
}
