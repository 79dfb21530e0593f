//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements             | Connects to                 |
//! |--------------|------------------------|-----------------------------|
//! | `log_sink`   | EventSink              | `log` facade                |
//! | `json_sink`  | EventSink              | JSON lines on any `Write`   |
//! | `panel`      | SwitchPort             | stimulus file timeline      |
//! |              | ConsolePort            | stdout                      |

pub mod json_sink;
pub mod log_sink;
pub mod panel;
