//! Asynchronous pixel readback.
//!
//! [`GraphicsDevice::read_pixels_async`] copies the framebuffer region into
//! a pixel-pack buffer and inserts a fence behind the copy. The caller then
//! polls [`GraphicsDevice::poll_readback`] until the fence signals; the
//! device never blocks on the driver. Dropping a [`PixelReadback`] without
//! polling it to completion leaks the fence and staging buffer until the
//! driver signals them; there is no explicit cancel.
//!
//! [`GraphicsDevice::read_pixels_async`]: crate::device::GraphicsDevice::read_pixels_async
//! [`GraphicsDevice::poll_readback`]: crate::device::GraphicsDevice::poll_readback

use crate::backend::{BufferId, FenceId};

/// An in-flight asynchronous pixel readback.
#[derive(Debug)]
pub struct PixelReadback {
    pub(crate) buffer: BufferId,
    pub(crate) fence: FenceId,
    pub(crate) byte_len: usize,
    pub(crate) finished: bool,
}

impl PixelReadback {
    /// Byte length of the pending result.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// True once the readback has delivered its result or failed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Outcome of one readback poll.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadbackStatus {
    /// The fence has not signaled yet; poll again later.
    Pending,
    /// The copy completed; the pixel bytes are ready.
    Ready(Vec<u8>),
    /// The fence wait failed; the readback is abandoned.
    Failed,
}
