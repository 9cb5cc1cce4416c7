use std::io::{self, Write};

use super::Session;
use crate::Error;

/// Request body stream, from [`Session::output_stream`].
///
/// For a fixed-length or chunked body the request head is already on the
/// wire and bytes are sent as they are written. Otherwise the bytes are
/// kept in memory until the request is executed.
///
/// The body is completed when the request executes. [`RequestBody::finish`]
/// does it early and reports errors directly.
#[derive(Debug)]
pub struct RequestBody<'a> {
    session: &'a mut Session,
}

impl<'a> RequestBody<'a> {
    pub(crate) fn new(session: &'a mut Session) -> Self {
        RequestBody { session }
    }

    /// Complete the body.
    ///
    /// A fixed-length body that is short of its announced length fails here.
    pub fn finish(self) -> Result<(), Error> {
        self.session.finish_body()
    }
}

impl Write for RequestBody<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.session.write_body(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.session.flush_body()?)
    }
}
