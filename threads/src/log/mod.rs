pub use tracing::{
    Level,
    debug,
    error,
    event,
    info,
    trace,
    warn,
};
