//! Traits connecting the protocol engine to application logic.

use crate::types::{Address, Reply};
use std::future::Future;
use std::net::SocketAddr;
use tokio::io::AsyncRead;

/// Creates one [`Session`] per accepted connection.
pub trait Backend: Send + Sync + 'static {
    /// Per-connection session type.
    type Session: Session;

    /// Creates a session for a new connection.
    fn new_session(&self, peer: Option<SocketAddr>) -> Self::Session;
}

/// Per-connection transaction handler.
///
/// The engine enforces command ordering before calling into the session
/// (MAIL after EHLO, RCPT after MAIL, DATA after RCPT). A returned [`Reply`]
/// is sent to the client verbatim.
pub trait Session: Send {
    /// Handles `AUTH` credentials. Accepts everything by default.
    fn auth(
        &mut self,
        _username: &str,
        _password: &str,
    ) -> impl Future<Output = Result<(), Reply>> + Send {
        async { Ok(()) }
    }

    /// Handles `MAIL FROM`.
    fn mail(&mut self, from: &Address) -> impl Future<Output = Result<(), Reply>> + Send;

    /// Handles `RCPT TO`.
    fn rcpt(&mut self, to: &Address) -> impl Future<Output = Result<(), Reply>> + Send;

    /// Handles the message content after the terminating `.` line, with
    /// dot-stuffing already removed.
    fn data<R: AsyncRead + Unpin + Send>(
        &mut self,
        reader: R,
    ) -> impl Future<Output = Result<(), Reply>> + Send;

    /// Handles `RSET`, and implicit resets after HELO/EHLO or a rejected
    /// DATA.
    fn reset(&mut self) -> impl Future<Output = ()> + Send;

    /// Handles `QUIT`. An error replaces the `221` reply; the connection is
    /// closed either way.
    fn logout(&mut self) -> impl Future<Output = Result<(), Reply>> + Send;
}
