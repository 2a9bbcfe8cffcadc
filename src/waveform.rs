//! Audio level visualization engine.
//!
//! Pure state machine driven by `tick()` at the render rate. Capture level
//! updates arrive asynchronously via `set_level`; everything else
//! (smoothing, the processing animation, the idle fade) is derived
//! deterministically from the tick counter so two instances fed the same
//! inputs render identically.

/// Smallest visible bar height.
const MIN_BAR: f32 = 0.02;
/// Largest bar height.
const MAX_BAR: f32 = 1.0;
/// Fraction of the remaining distance to the target covered per tick.
const SMOOTHING: f32 = 0.15;
/// Blend progress toward the processing pattern per tick. Full blend
/// takes 25 ticks.
const BLEND_STEP: f32 = 0.04;
/// Clock advance per processing tick.
const TIME_STEP: f32 = 0.1;
/// Exponential decay rate while fading out.
const IDLE_FADE: f32 = 0.03;
/// Below this peak height the fade snaps to fully idle.
const IDLE_SNAP: f32 = 0.05;
/// How strongly levels are attenuated toward the edges.
const CENTER_FALLOFF: f32 = 0.4;

/// Rendering mode of the waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveformMode {
    /// Nothing to show; all bars at the floor.
    Idle,
    /// Live capture; bars track the microphone level.
    Active,
    /// Transcription in flight; bars blend into a synthetic wave pattern.
    Processing,
    /// Capture ended; bars decay toward the floor.
    IdleFade,
}

/// Bar-height model behind the capture overlay.
pub struct Waveform {
    bars: Vec<f32>,
    targets: Vec<f32>,
    mode: WaveformMode,
    clock: f32,
    blend: f32,
    snapshot: Vec<f32>,
    edge_mask: Vec<f32>,
    mask_generation: u64,
}

impl Waveform {
    pub fn new(width: usize) -> Self {
        let mut wf = Self {
            bars: vec![MIN_BAR; width],
            targets: vec![MIN_BAR; width],
            mode: WaveformMode::Idle,
            clock: 0.0,
            blend: 0.0,
            snapshot: Vec::new(),
            edge_mask: Vec::new(),
            mask_generation: 0,
        };
        wf.rebuild_mask();
        wf
    }

    pub fn mode(&self) -> WaveformMode {
        self.mode
    }

    pub fn bars(&self) -> &[f32] {
        &self.bars
    }

    #[cfg(test)]
    fn mask_generation(&self) -> u64 {
        self.mask_generation
    }

    /// Change the bar count. Resets heights and regenerates the cached
    /// edge mask; the current mode is preserved.
    pub fn resize(&mut self, width: usize) {
        if width == self.bars.len() {
            return;
        }
        self.bars = vec![MIN_BAR; width];
        self.targets = vec![MIN_BAR; width];
        self.snapshot.clear();
        self.rebuild_mask();
    }

    /// Enter live capture mode.
    pub fn start_capture(&mut self) {
        self.mode = WaveformMode::Active;
        self.targets.fill(MIN_BAR);
    }

    /// Enter processing mode, blending from whatever the bars show now.
    pub fn start_processing(&mut self) {
        self.snapshot = self.bars.clone();
        self.clock = 0.0;
        self.blend = 0.0;
        self.mode = WaveformMode::Processing;
    }

    /// Begin fading the bars out.
    pub fn start_idle_fade(&mut self) {
        self.mode = WaveformMode::IdleFade;
    }

    /// Drop straight to idle with no animation.
    pub fn reset(&mut self) {
        self.mode = WaveformMode::Idle;
        self.bars.fill(MIN_BAR);
        self.targets.fill(MIN_BAR);
        self.blend = 0.0;
        self.clock = 0.0;
    }

    /// Feed a capture level in the 0 to 100 range. Only meaningful in
    /// Active mode; targets set here are picked up by subsequent ticks.
    pub fn set_level(&mut self, level: f32) {
        let norm = (level / 100.0).clamp(0.0, 1.0);
        for (i, (target, mask)) in self.targets.iter_mut().zip(&self.edge_mask).enumerate() {
            let height = norm * mask * Self::bar_variation(i);
            *target = height.clamp(MIN_BAR, MAX_BAR);
        }
    }

    /// Advance one animation frame.
    pub fn tick(&mut self) {
        match self.mode {
            WaveformMode::Idle => {}
            WaveformMode::Active => {
                for (bar, target) in self.bars.iter_mut().zip(&self.targets) {
                    *bar += (target - *bar) * SMOOTHING;
                    *bar = bar.clamp(MIN_BAR, MAX_BAR);
                }
            }
            WaveformMode::Processing => {
                self.clock += TIME_STEP;
                self.blend = (self.blend + BLEND_STEP).min(1.0);
                let width = self.bars.len();
                for i in 0..width {
                    let p = Self::position(i, width);
                    let pattern = Self::processing_pattern(p, self.clock) * self.edge_mask[i];
                    let from = self.snapshot.get(i).copied().unwrap_or(MIN_BAR);
                    self.bars[i] =
                        (from + (pattern - from) * self.blend).clamp(MIN_BAR, MAX_BAR);
                }
            }
            WaveformMode::IdleFade => {
                let mut peak: f32 = 0.0;
                for bar in &mut self.bars {
                    *bar = MIN_BAR + (*bar - MIN_BAR) * (1.0 - IDLE_FADE);
                    peak = peak.max(*bar);
                }
                if peak < IDLE_SNAP {
                    self.reset();
                }
            }
        }
    }

    /// Normalized bar position in [-1, 1].
    fn position(index: usize, width: usize) -> f32 {
        if width <= 1 {
            return 0.0;
        }
        (index as f32 / (width - 1) as f32) * 2.0 - 1.0
    }

    /// Fixed per-bar gain so a flat level still reads as a waveform.
    /// Deterministic so repeated identical levels converge monotonically.
    fn bar_variation(index: usize) -> f32 {
        let phase = (index as f32 * 2.399) % (2.0 * std::f32::consts::PI);
        0.85 + (phase.sin() * 0.5 + 0.5) * 0.3
    }

    /// Synthetic wave shown while transcription is in flight. Three
    /// overlapping waves keep the motion from looking periodic at a
    /// glance.
    fn processing_pattern(p: f32, t: f32) -> f32 {
        let wave = (t * 1.5 + p * 3.0).sin() * 0.25
            + (t * 0.8 - p * 2.0).sin() * 0.2
            + (t * 2.0 + p).cos() * 0.15;
        (0.5 + wave).clamp(MIN_BAR, MAX_BAR)
    }

    fn rebuild_mask(&mut self) {
        let width = self.bars.len();
        self.edge_mask = (0..width)
            .map(|i| {
                let p = Self::position(i, width);
                1.0 - p.abs() * CENTER_FALLOFF
            })
            .collect();
        self.mask_generation += 1;
    }
}
