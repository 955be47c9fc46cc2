// ============================================================
// Layer 4 — Sequence Batcher
// ============================================================
// Turns a flat token stream into parallel columns and slices
// fixed-length BPTT windows out of them.
//
// batchify: with the alphabet as the stream and width 4,
//
//   ┌ a g m s ┐
//   │ b h n t │
//   │ c i o u │
//   │ d j p v │
//   │ e k q w │
//   └ f l r x ┘      (y, z are trimmed)
//
// Time runs down the rows. Each column is an independent
// contiguous block of the stream, so 'g' never sees 'f'.
//
// get_window: with max_len 2 and start 0 the window is
//
//   input  ┌ a g m s ┐   target ┌ b h n t ┐
//          └ b h n t ┘          └ c i o u ┘  (flattened row by row)
//
// Windows advance by max_len along the time axis; the last
// one is shorter when (rows - 1) is not a multiple of max_len.
//
// Reference: Rust Book §8 (Vectors and Slices)

use burn::prelude::*;

use crate::error::{ensure_precondition, EngineError};

// ─── BatchedStream ────────────────────────────────────────────────────────────
/// A (rows × width) token matrix stored row-major, time-leading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchedStream {
    tokens: Vec<usize>,
    rows:   usize,
    width:  usize,
}

/// Reshape `stream` into `width` contiguous columns.
///
/// Trailing tokens that do not fill a complete row are dropped.
/// The input slice is never modified.
pub fn batchify(stream: &[usize], width: usize) -> Result<BatchedStream, EngineError> {
    ensure_precondition!(width >= 1, "batch width must be at least 1");

    let rows = stream.len() / width;
    let mut tokens = Vec::with_capacity(rows * width);
    for t in 0..rows {
        for c in 0..width {
            tokens.push(stream[c * rows + t]);
        }
    }

    tracing::debug!(
        "batchify: {} tokens → {}×{} (dropped {})",
        stream.len(), rows, width, stream.len() - rows * width,
    );
    Ok(BatchedStream { tokens, rows, width })
}

impl BatchedStream {
    /// Number of time steps (sequence length).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of parallel columns (batch width).
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn row(&self, t: usize) -> &[usize] {
        &self.tokens[t * self.width..(t + 1) * self.width]
    }

    pub fn get(&self, t: usize, c: usize) -> usize {
        self.tokens[t * self.width + c]
    }

    /// Largest token index in the matrix, if any.
    pub fn max_token(&self) -> Option<usize> {
        self.tokens.iter().copied().max()
    }

    /// Slice the window starting at time step `start`.
    pub fn window(&self, start: usize, max_len: usize) -> Result<Window, EngineError> {
        get_window(self, start, max_len)
    }

    /// All windows in order: starts 0, max_len, 2·max_len, … < rows − 1.
    pub fn windows(&self, max_len: usize) -> Result<impl Iterator<Item = Window> + '_, EngineError> {
        ensure_precondition!(max_len >= 1, "window length must be at least 1");
        let last = self.rows.saturating_sub(1);
        Ok((0..last)
            .step_by(max_len)
            .map(move |start| cut_window(self, start, max_len)))
    }

    /// How many windows `windows(max_len)` yields.
    pub fn num_windows(&self, max_len: usize) -> Result<usize, EngineError> {
        ensure_precondition!(max_len >= 1, "window length must be at least 1");
        Ok(self.rows.saturating_sub(1).div_ceil(max_len))
    }
}

// ─── Window ───────────────────────────────────────────────────────────────────
/// One BPTT step: `len` rows of input and the same rows shifted by one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub start:  usize,
    pub len:    usize,
    pub width:  usize,
    /// Row-major (len × width)
    pub input:  Vec<usize>,
    /// input shifted one step forward in time, flattened
    pub target: Vec<usize>,
}

/// Cut the window at `start`; its length is min(max_len, rows − 1 − start).
pub fn get_window(
    batched: &BatchedStream,
    start:   usize,
    max_len: usize,
) -> Result<Window, EngineError> {
    ensure_precondition!(max_len >= 1, "window length must be at least 1");
    ensure_precondition!(
        start + 1 < batched.rows,
        "window start {} leaves no target rows in a {}-row matrix",
        start, batched.rows,
    );

    Ok(cut_window(batched, start, max_len))
}

/// Caller guarantees max_len ≥ 1 and start + 1 < rows.
fn cut_window(batched: &BatchedStream, start: usize, max_len: usize) -> Window {
    let len   = max_len.min(batched.rows - 1 - start);
    let width = batched.width;
    let input  = batched.tokens[start * width..(start + len) * width].to_vec();
    let target = batched.tokens[(start + 1) * width..(start + 1 + len) * width].to_vec();

    Window { start, len, width, input, target }
}

impl Window {
    /// Shape of the input block as (time, batch).
    pub fn input_shape(&self) -> [usize; 2] {
        [self.len, self.width]
    }

    /// Input as a [len, width] Int tensor and targets as a [len·width] Int tensor.
    pub fn to_tensors<B: Backend>(
        &self,
        device: &B::Device,
    ) -> (Tensor<B, 2, Int>, Tensor<B, 1, Int>) {
        let input_flat:  Vec<i32> = self.input.iter().map(|&x| x as i32).collect();
        let target_flat: Vec<i32> = self.target.iter().map(|&x| x as i32).collect();

        let input = Tensor::<B, 1, Int>::from_ints(input_flat.as_slice(), device)
            .reshape([self.len, self.width]);
        let target = Tensor::<B, 1, Int>::from_ints(target_flat.as_slice(), device);
        (input, target)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn stream(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn test_batchify_100_by_10() {
        let m = batchify(&stream(100), 10).unwrap();
        assert_eq!(m.rows(), 10);
        assert_eq!(m.width(), 10);
        // Column c holds stream[c*10 .. c*10+10] in order
        assert_eq!(m.get(0, 3), 30);
        assert_eq!(m.get(9, 3), 39);
        assert_eq!(m.row(1), &[1, 11, 21, 31, 41, 51, 61, 71, 81, 91]);
    }

    #[test]
    fn test_batchify_trims_remainder() {
        let s = stream(26);
        let m = batchify(&s, 4).unwrap();
        assert_eq!(m.rows(), 6);
        assert_eq!(m.row(0), &[0, 6, 12, 18]);
        assert_eq!(m.row(5), &[5, 11, 17, 23]);
        assert!(m.rows() * m.width() <= s.len());
    }

    #[test]
    fn test_batchify_is_pure() {
        let s = stream(37);
        let before = s.clone();
        let a = batchify(&s, 3).unwrap();
        let b = batchify(&s, 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(s, before);
    }

    #[test]
    fn test_batchify_edge_widths() {
        assert!(batchify(&stream(10), 0).is_err());
        let empty = batchify(&[], 5).unwrap();
        assert_eq!(empty.rows(), 0);
        assert_eq!(empty.num_windows(3).unwrap(), 0);
        assert_eq!(empty.windows(3).unwrap().count(), 0);
        let single = batchify(&stream(7), 1).unwrap();
        assert_eq!(single.rows(), 7);
        assert_eq!(single.row(6), &[6]);
    }

    #[test]
    fn test_window_shapes() {
        let m = batchify(&stream(100), 10).unwrap();
        let w = get_window(&m, 0, 5).unwrap();
        assert_eq!(w.input_shape(), [5, 10]);
        assert_eq!(w.target.len(), 50);
        // target is input shifted by one row
        assert_eq!(&w.target[..10], m.row(1));
        assert_eq!(&w.input[40..50], m.row(4));
    }

    #[test]
    fn test_last_window_is_shorter() {
        let m = batchify(&stream(100), 10).unwrap();
        let w = m.window(5, 5).unwrap();
        // rows - 1 - start = 4
        assert_eq!(w.len, 4);
        assert_eq!(w.input.len(), w.target.len());
        assert!(m.window(9, 5).is_err());
        assert!(m.window(0, 0).is_err());
    }

    #[test]
    fn test_windows_partition_time_axis() {
        let m = batchify(&stream(230), 10).unwrap(); // 23 rows
        for max_len in [1, 4, 5, 22, 35] {
            let windows: Vec<Window> = m.windows(max_len).unwrap().collect();
            assert_eq!(windows.len(), m.num_windows(max_len).unwrap());
            let mut expected_start = 0;
            for w in &windows {
                assert_eq!(w.start, expected_start);
                assert!(w.len <= max_len);
                assert!(w.target.len() <= w.input.len());
                expected_start += w.len;
            }
            assert_eq!(expected_start, m.rows() - 1);
        }
    }

    #[test]
    fn test_zero_window_length_is_rejected_consistently() {
        let m = batchify(&stream(100), 10).unwrap();
        assert!(matches!(m.windows(0), Err(EngineError::Precondition(_))));
        assert!(matches!(m.num_windows(0), Err(EngineError::Precondition(_))));
    }

    #[test]
    fn test_window_tensors() {
        type B = burn::backend::NdArray;
        let device = Default::default();
        let m = batchify(&stream(24), 4).unwrap();
        let w = m.window(1, 3).unwrap();
        let (input, target) = w.to_tensors::<B>(&device);
        assert_eq!(input.dims(), [3, 4]);
        assert_eq!(target.dims(), [12]);
        let first: Vec<i64> = target.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(first[..4], [2, 8, 14, 20]);
    }
}
