// Network quality measurement engine
//
// Runs monitoring sessions that issue periodic latency probes and less
// frequent throughput samples, keeping results in a bounded in-memory log.
//
// Key design decisions:
// - Network access sits behind traits (ProbeTransport, DownloadSource) with a
//   reqwest implementation; tests drive the engine with in-memory fakes
// - All timing goes through the Clock trait and tokio::time, so paused-time
//   tests are deterministic
// - The SessionController is the only writer of session state and the log;
//   probe and sample tasks report back through it
// - At most one throughput sample runs at a time, enforced by SampleSlot
// - Stopping a session cancels the in-flight download and drops late results

pub mod clock;
pub mod config;
pub mod error;
pub mod export;
pub mod log;
pub mod probe;
pub mod record;
pub mod sampler;
pub mod scheduler;
pub mod session;
pub mod telemetry;
pub mod transport;

// Re-exports for convenience
pub use clock::{Clock, SystemClock};
pub use config::{DownloadPreset, SessionConfig, TransportConfig};
pub use error::{MonitorError, Result};
pub use export::ExportRow;
pub use log::{MeasurementLog, SessionStats};
pub use probe::LatencyProber;
pub use record::{
    HistoryPoint, Measurement, MeasurementKind, MeasurementStatus, ProbeRecord, SampleRecord,
};
pub use sampler::{DownloadProgress, ThroughputSampler};
pub use scheduler::{SampleSlot, SampleTicket, Scheduler, TickPlan};
pub use session::{SessionController, SessionState, StopReason};
pub use telemetry::{init_telemetry, TelemetryConfig};
pub use transport::{Download, DownloadSource, HttpTransport, ProbeTransport};
