/// Straight-alpha RGBA8 pixel buffer, row-major, tightly packed.
///
/// Used both for source-surface readback and as the off-screen compositing
/// target a capture session mutates every frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRgba {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl FrameRgba {
    /// Transparent-black frame of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; (width as usize) * (height as usize) * 4],
        }
    }

    /// Opaque frame filled with a single color.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut frame = Self::new(width, height);
        for px in frame.data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
        frame
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }
        self.width = width;
        self.height = height;
        self.data.clear();
        self.data
            .resize((width as usize) * (height as usize) * 4, 0);
    }

    /// Full overwrite copy of `src` at the origin.
    ///
    /// Same-size frames take the memcpy path. After a mid-recording resize
    /// the sizes can differ: the target is cleared and the overlapping
    /// region blitted, everything else stays transparent black.
    pub fn copy_from(&mut self, src: &FrameRgba) {
        if self.width == src.width && self.height == src.height {
            self.data.copy_from_slice(&src.data);
            return;
        }

        self.data.fill(0);
        let w = self.width.min(src.width) as usize;
        let h = self.height.min(src.height) as usize;
        for y in 0..h {
            let src_off = y * src.width as usize * 4;
            let dst_off = y * self.width as usize * 4;
            self.data[dst_off..dst_off + w * 4]
                .copy_from_slice(&src.data[src_off..src_off + w * 4]);
        }
    }

    /// Overwrite a rectangle with an opaque color, clipped to the frame.
    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, rgba: [u8; 4]) {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = x.saturating_add(w as i32).min(self.width as i32);
        let y1 = y.saturating_add(h as i32).min(self.height as i32);
        for py in y0..y1 {
            let row = py as usize * self.width as usize * 4;
            for px in x0..x1 {
                let off = row + px as usize * 4;
                self.data[off..off + 4].copy_from_slice(&rgba);
            }
        }
    }

    /// Blend one straight-alpha pixel over the frame at `(x, y)`.
    /// Out-of-range coordinates clip silently.
    pub fn blend_pixel(&mut self, x: i32, y: i32, rgba: [u8; 4], opacity: f32) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let off = (y as usize * self.width as usize + x as usize) * 4;
        let dst = pixel_at(&self.data, off);
        let out = over_straight(dst, rgba, opacity);
        self.data[off..off + 4].copy_from_slice(&out);
    }

    /// Blend a whole straight-alpha RGBA8 image over the frame with the
    /// given top-left position and opacity, clipped to the frame bounds.
    pub fn blend_image(
        &mut self,
        src: &[u8],
        src_width: u32,
        src_height: u32,
        x: i32,
        y: i32,
        opacity: f32,
    ) {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = x.saturating_add(src_width as i32).min(self.width as i32);
        let y1 = y.saturating_add(src_height as i32).min(self.height as i32);

        for ty in y0..y1 {
            let sy = (ty - y) as usize;
            for tx in x0..x1 {
                let sx = (tx - x) as usize;
                let s_off = (sy * src_width as usize + sx) * 4;
                let d_off = (ty as usize * self.width as usize + tx as usize) * 4;
                let dst = pixel_at(&self.data, d_off);
                let fg = pixel_at(src, s_off);
                let out = over_straight(dst, fg, opacity);
                self.data[d_off..d_off + 4].copy_from_slice(&out);
            }
        }
    }
}

fn pixel_at(data: &[u8], off: usize) -> [u8; 4] {
    [data[off], data[off + 1], data[off + 2], data[off + 3]]
}

/// Porter-Duff "over" for straight-alpha pixels with an extra opacity
/// multiplier on the foreground alpha.
pub fn over_straight(dst: [u8; 4], src: [u8; 4], opacity: f32) -> [u8; 4] {
    let fa = (src[3] as f32 / 255.0) * opacity.clamp(0.0, 1.0);
    if fa <= 0.0 {
        return dst;
    }
    let ba = dst[3] as f32 / 255.0;
    let oa = fa + ba * (1.0 - fa);
    if oa < f32::EPSILON {
        return [0, 0, 0, 0];
    }

    let mut out = [0u8; 4];
    for i in 0..3 {
        let f = src[i] as f32 / 255.0;
        let b = dst[i] as f32 / 255.0;
        let c = (f * fa + b * ba * (1.0 - fa)) / oa;
        out[i] = (c * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (oa * 255.0).round().clamp(0.0, 255.0) as u8;
    out
}
