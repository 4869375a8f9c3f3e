//! VNC client runtime.
//!
//! Connects to an RFB server over any async duplex stream, runs the
//! handshake, and exposes the steady state as a pair of channels plus a
//! shared canvas:
//!
//! ```no_run
//! use rfb_client::{connect, ClientConfig, ClientCommand, ServerEvent};
//!
//! # async fn example() -> Result<(), rfb_client::RfbClientError> {
//! let stream = tokio::net::TcpStream::connect("127.0.0.1:5900").await?;
//! let session = connect(stream, ClientConfig::builder().password("secret").build()?).await?;
//!
//! while let Ok(event) = session.events.recv_async().await {
//!     match event {
//!         ServerEvent::FramebufferUpdated { .. } => {
//!             session.commands.send(ClientCommand::RequestUpdate {
//!                 incremental: true,
//!                 x: 0, y: 0, width: u16::MAX, height: u16::MAX,
//!             }).ok();
//!         }
//!         ServerEvent::ConnectionClosed => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Recorded FBS sessions replay through [`replay::ReplaySession`] with the
//! same decoding machinery, and completed frames can be handed to a
//! [`frames::FrameSink`].

pub mod config;
pub mod errors;
pub mod events;
pub mod frames;
pub mod replay;
pub mod session;
mod update;

pub use config::{ClientConfig, ClientConfigBuilder};
pub use errors::RfbClientError;
pub use events::{ClientCommand, ServerEvent};
pub use frames::{FrameSink, PngSequenceSink};
pub use replay::{ReplayOptions, ReplaySession};
pub use session::{connect, Session};
