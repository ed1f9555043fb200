use parking_lot::RwLock;

use crate::frame::FrameRgba;

/// A live drawing surface that can be recorded: something with known pixel
/// dimensions whose current contents can be read back at any time.
///
/// The recorder only ever reads; whatever host code animates the surface
/// keeps exclusive write access.
pub trait RecordSurface: Send + Sync {
    fn dimensions(&self) -> (u32, u32);

    /// Copy the surface's current pixels into `frame`, resizing it to the
    /// surface's dimensions first if needed.
    fn read_into(&self, frame: &mut FrameRgba);
}

/// In-memory drawing surface backed by a shared RGBA8 buffer.
///
/// Host code draws through [`PixelSurface::draw`] while a capture session
/// reads frames concurrently; a frame read never observes a half-applied
/// draw closure.
pub struct PixelSurface {
    inner: RwLock<FrameRgba>,
}

impl PixelSurface {
    /// Opaque black surface of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            inner: RwLock::new(FrameRgba::filled(width, height, [0, 0, 0, 255])),
        }
    }

    /// Mutate the surface contents under the write lock.
    pub fn draw(&self, f: impl FnOnce(&mut FrameRgba)) {
        let mut guard = self.inner.write();
        f(&mut guard);
    }

    /// Resize the surface, clearing it to transparent black.
    pub fn resize(&self, width: u32, height: u32) {
        self.inner.write().resize(width, height);
    }

    pub fn snapshot(&self) -> FrameRgba {
        self.inner.read().clone()
    }
}

impl RecordSurface for PixelSurface {
    fn dimensions(&self) -> (u32, u32) {
        let guard = self.inner.read();
        (guard.width, guard.height)
    }

    fn read_into(&self, frame: &mut FrameRgba) {
        let guard = self.inner.read();
        frame.resize(guard.width, guard.height);
        frame.data.copy_from_slice(&guard.data);
    }
}
