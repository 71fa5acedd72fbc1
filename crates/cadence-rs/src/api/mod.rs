//! API interaction layer: SSE frame parsing, response reassembly, and retry.
//!
//! These modules sit between the [`Runner`](crate::runner::Runner) loop and
//! the remote endpoints:
//!
//! - [`streaming`] — parser for `data: `-prefixed SSE frames. Malformed
//!   payloads are skipped at the frame level, never failing the stream.
//! - [`reassembly`] — regroups arbitrarily-chunked text deltas into cleaned
//!   sentence/list units; the newline-join of the units is the canonical
//!   response text.
//! - [`retry`] — transient error detection (429, 5xx, network timeouts) with
//!   configurable exponential backoff, and the shared async retry driver.

pub mod reassembly;
pub mod retry;
pub mod streaming;

// Re-export commonly used items at the module level.
pub use reassembly::Reassembler;
pub use retry::RetryConfig;
pub use streaming::StreamEvent;
