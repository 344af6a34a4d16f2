// ============================================================================
// renderer.rs — lifegrid
// HUD text overlay via glyphon.
// ============================================================================

use glyphon::{
    Attrs, Buffer as TextBuffer, Cache as GlyphCache, Color as GlyphColor, Family, FontSystem,
    Metrics, Resolution, Shaping, SwashCache, TextArea, TextAtlas, TextBounds, TextRenderer,
    Viewport as GlyphViewport,
};

/// Values shown in the overlay for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HudStats {
    pub generation: u64,
    pub fps: f32,
    pub paused: bool,
    pub zoom: f32,
    pub edit_radius: i32,
    pub grid_size: [u32; 2],
}

/// All glyphon resources needed for HUD text rendering.
pub struct HudRenderer {
    font_system: FontSystem,
    swash_cache: SwashCache,
    glyph_viewport: GlyphViewport,
    text_atlas: TextAtlas,
    text_renderer: TextRenderer,
    text_buf: TextBuffer,
}

impl HudRenderer {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        let mut font_system = FontSystem::new();
        let swash_cache = SwashCache::new();
        let glyph_cache = GlyphCache::new(device);
        let glyph_viewport = GlyphViewport::new(device, &glyph_cache);
        let mut text_atlas = TextAtlas::new(device, queue, &glyph_cache, surface_format);
        let text_renderer =
            TextRenderer::new(&mut text_atlas, device, wgpu::MultisampleState::default(), None);
        let text_buf = TextBuffer::new(&mut font_system, Metrics::new(14.0, 18.0));

        Self {
            font_system,
            swash_cache,
            glyph_viewport,
            text_atlas,
            text_renderer,
            text_buf,
        }
    }

    /// Shape and upload the overlay text for this frame.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        stats: &HudStats,
        win_w: u32,
        win_h: u32,
    ) {
        self.glyph_viewport.update(
            queue,
            Resolution {
                width: win_w,
                height: win_h,
            },
        );

        self.text_buf
            .set_size(&mut self.font_system, Some(win_w as f32), Some(win_h as f32));
        self.text_buf.set_text(
            &mut self.font_system,
            &build_hud_text(stats),
            Attrs::new().family(Family::Monospace),
            Shaping::Basic,
        );
        self.text_buf
            .shape_until_scroll(&mut self.font_system, false);

        let prepared = self.text_renderer.prepare(
            device,
            queue,
            &mut self.font_system,
            &mut self.text_atlas,
            &self.glyph_viewport,
            [TextArea {
                buffer: &self.text_buf,
                left: 10.0,
                top: 10.0,
                scale: 1.0,
                bounds: TextBounds {
                    left: 0,
                    top: 0,
                    right: win_w as i32,
                    bottom: win_h as i32,
                },
                default_color: GlyphColor::rgb(220, 220, 220),
                custom_glyphs: &[],
            }],
            &mut self.swash_cache,
        );
        if let Err(err) = prepared {
            log::warn!("HUD prepare failed: {err}");
        }
    }

    /// Render HUD overlay into an active render pass.
    pub fn render<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>) {
        if let Err(err) = self
            .text_renderer
            .render(&self.text_atlas, &self.glyph_viewport, pass)
        {
            log::warn!("HUD render failed: {err}");
        }
    }

    /// Trim the glyph atlas after presenting.
    pub fn trim(&mut self) {
        self.text_atlas.trim();
    }
}

// ======================== HUD Text Builder ========================

fn build_hud_text(stats: &HudStats) -> String {
    let pause_status = if stats.paused { " [PAUSED]" } else { "" };
    format!(
        "Gen: {}   FPS: {:.0}{}   Zoom: {:.2}   Radius: {}   Grid: {}x{}\n\
         LMB: Fill | RMB: Clear | MMB: Pan | Wheel: Radius | Shift+Wheel: Zoom\n\
         Space: Pause | C: Clear | R: Reseed | [ ]: Grid size | Esc: Quit",
        stats.generation,
        stats.fps,
        pause_status,
        stats.zoom,
        stats.edit_radius,
        stats.grid_size[0],
        stats.grid_size[1],
    )
}
