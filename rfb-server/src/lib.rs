//! VNC server runtime: the protocol half of accepting, authenticating and
//! serving RFB clients.
//!
//! This crate does no screen capture; the embedding application draws into
//! the session's canvas and decides when updates go out:
//!
//! ```no_run
//! use rfb_server::{accept, ServerConfig, ClientEvent, ServerCommand, UpdateRect};
//! use rfb_encodings::ENCODING_ZRLE;
//!
//! # async fn example() -> Result<(), rfb_server::RfbServerError> {
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:5900").await?;
//! let (stream, _addr) = listener.accept().await?;
//! let session = accept(stream, ServerConfig::new(1280, 800)).await?;
//!
//! while let Ok(event) = session.events.recv_async().await {
//!     match event {
//!         ClientEvent::UpdateRequested { x, y, width, height, .. } => {
//!             session.commands.send(ServerCommand::SendUpdate {
//!                 rects: vec![UpdateRect { x, y, width, height, encoding: ENCODING_ZRLE }],
//!             }).ok();
//!         }
//!         ClientEvent::ConnectionClosed => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod events;
pub mod session;

pub use config::ServerConfig;
pub use errors::RfbServerError;
pub use events::{ClientEvent, ServerCommand, UpdateRect};
pub use session::{accept, ServerSession};
