//! Sliding-window assembly of raw capture into overlapping analysis windows.
//!
//! ## Discipline
//!
//! The assembler owns one `i16` buffer of length `window_len` split into two
//! halves of `half_len`. Each capture cycle delivers one half-buffer:
//!
//! ```text
//! cycle 0 (priming):  [A|_]            → no window
//! cycle 1:            [A|B]            → emit A‖B
//! cycle 2:            [B|C]  (shift)   → emit B‖C
//! cycle 3:            [C|D]  (shift)   → emit C‖D
//! ```
//!
//! Consecutive windows therefore overlap by 50 %, which is why the pipeline
//! runs an [`OverlapGate`](crate::gate::OverlapGate) downstream.
//!
//! Emitted windows are owned copies. The internal buffer keeps mutating for
//! the next cycle, so handing out a reference would alias live state.

use tracing::trace;

/// One completed analysis window: `window_len` mono i16 samples,
/// independently owned by the receiver after handoff.
pub type AnalysisWindow = Vec<i16>;

/// Phase of the priming state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// First half-buffer not yet received.
    Empty,
    /// First half filled; second half pending.
    HalfFilled,
    /// Both halves filled; every subsequent push shifts and emits.
    Steady,
}

/// Assembles fixed-length half-buffers into 50 %-overlapping windows.
#[derive(Debug)]
pub struct WindowAssembler {
    buf: Vec<i16>,
    half_len: usize,
    phase: Phase,
}

impl WindowAssembler {
    /// `window_len` must be even; each push must supply exactly `window_len / 2`
    /// samples.
    pub fn new(window_len: usize) -> Self {
        assert!(window_len > 0 && window_len % 2 == 0, "window_len must be even");
        Self {
            buf: vec![0i16; window_len],
            half_len: window_len / 2,
            phase: Phase::Empty,
        }
    }

    /// Number of samples expected per [`push_half`](Self::push_half) call.
    pub fn half_len(&self) -> usize {
        self.half_len
    }

    /// Accept one half-buffer of exactly `half_len` samples.
    ///
    /// Returns a completed window in every phase except the first (priming)
    /// call. The returned window is a copy; the assembler's own buffer is
    /// never aliased.
    ///
    /// # Panics
    /// Panics if `half.len() != half_len` — the capture loop always delivers
    /// exact halves, so a mismatch is a programming error upstream.
    pub fn push_half(&mut self, half: &[i16]) -> Option<AnalysisWindow> {
        assert_eq!(
            half.len(),
            self.half_len,
            "half-buffer length must equal half_len"
        );

        match self.phase {
            Phase::Empty => {
                self.buf[..self.half_len].copy_from_slice(half);
                self.phase = Phase::HalfFilled;
                trace!("assembler primed with first half-buffer");
                None
            }
            Phase::HalfFilled => {
                self.buf[self.half_len..].copy_from_slice(half);
                self.phase = Phase::Steady;
                Some(self.buf.clone())
            }
            Phase::Steady => {
                // Shift: discard the oldest half, keep the newest as overlap.
                self.buf.copy_within(self.half_len.., 0);
                self.buf[self.half_len..].copy_from_slice(half);
                Some(self.buf.clone())
            }
        }
    }

    /// Drop all buffered samples and return to the priming phase.
    pub fn reset(&mut self) {
        self.buf.fill(0);
        self.phase = Phase::Empty;
    }
}
