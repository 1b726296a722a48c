use crate::mood::{cycle_duration, LightCue};

/// Inclusive bounds applied to every derived alpha/opacity.
pub const WASH_ALPHA_RANGE: (f64, f64) = (0.25, 0.85);
pub const GLOW_ALPHA_RANGE: (f64, f64) = (0.0, 0.75);
pub const GLOW_OPACITY_RANGE: (f64, f64) = (0.0, 0.8);
pub const BEAM_ALPHA_RANGE: (f64, f64) = (0.0, 0.55);
pub const BEAM_OPACITY_RANGE: (f64, f64) = (0.0, 0.45);

const GLOW_BASE_BLUR_PX: i64 = 80;
const GLOW_BLUR_PER_INTENSITY: f64 = 140.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WashLook {
    pub rgb: [u8; 3],
    pub alpha: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlowLook {
    pub rgb: [u8; 3],
    pub alpha: f64,
    pub opacity: f64,
    pub blur_px: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamLook {
    pub rgb: [u8; 3],
    pub alpha: f64,
    pub opacity: f64,
}

/// Everything a single cue contributes to the three layers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CueLook {
    pub wash: WashLook,
    pub glow: GlowLook,
    pub beam: BeamLook,
}

impl CueLook {
    pub fn from_cue(cue: &LightCue) -> Self {
        let rgb = cue.rgb;
        let intensity = cue.intensity();
        let blur = GLOW_BASE_BLUR_PX + (intensity * GLOW_BLUR_PER_INTENSITY).trunc() as i64;
        Self {
            wash: WashLook {
                rgb,
                alpha: bounded(intensity + 0.15, WASH_ALPHA_RANGE),
            },
            glow: GlowLook {
                rgb,
                alpha: bounded(intensity + 0.2, GLOW_ALPHA_RANGE),
                opacity: bounded(intensity + 0.15, GLOW_OPACITY_RANGE),
                blur_px: blur.clamp(0, i64::from(u32::MAX)) as u32,
            },
            beam: BeamLook {
                rgb,
                alpha: bounded(intensity + 0.05, BEAM_ALPHA_RANGE),
                opacity: bounded(intensity + 0.05, BEAM_OPACITY_RANGE),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe<T> {
    /// Position in the cycle, 0.0..=100.0.
    pub percent: f64,
    pub look: T,
}

/// Three parallel looping tracks sharing one cycle duration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LightingAnimation {
    pub background: Vec<Keyframe<WashLook>>,
    pub glow: Vec<Keyframe<GlowLook>>,
    pub beam: Vec<Keyframe<BeamLook>>,
    pub total_duration: f64,
}

impl LightingAnimation {
    pub fn is_empty(&self) -> bool {
        self.background.is_empty()
    }

    fn push(&mut self, percent: f64, look: CueLook) {
        self.background.push(Keyframe {
            percent,
            look: look.wash,
        });
        self.glow.push(Keyframe {
            percent,
            look: look.glow,
        });
        self.beam.push(Keyframe {
            percent,
            look: look.beam,
        });
    }
}

pub fn render_animation(cues: &[LightCue]) -> LightingAnimation {
    let Some(first) = cues.first() else {
        return LightingAnimation::default();
    };

    let total_duration = cycle_duration(cues);
    let mut animation = LightingAnimation {
        total_duration,
        ..LightingAnimation::default()
    };

    let mut elapsed = 0.0;
    for cue in cues {
        let percent = (elapsed / total_duration * 100.0).clamp(0.0, 100.0);
        animation.push(percent, CueLook::from_cue(cue));
        elapsed += cue.duration;
    }
    animation.push(100.0, CueLook::from_cue(first));
    animation
}

fn bounded(value: f64, (lo, hi): (f64, f64)) -> f64 {
    value.clamp(lo, hi)
}

#[cfg(test)]
mod tests {
    use super::{render_animation, CueLook, BEAM_OPACITY_RANGE, WASH_ALPHA_RANGE};
    use crate::mood::LightCue;

    #[test]
    fn empty_cues_render_nothing() {
        let animation = render_animation(&[]);
        assert!(animation.is_empty());
        assert!(animation.glow.is_empty());
        assert!(animation.beam.is_empty());
    }

    #[test]
    fn single_cue_closing_frame_matches_the_cue() {
        let cue = LightCue::new([40, 60, 200], 3.0, Some(0.35));
        let animation = render_animation(&[cue]);
        assert_eq!(animation.background.len(), 2);
        assert_eq!(animation.total_duration, 3.0);

        let look = CueLook::from_cue(&cue);
        assert_eq!(animation.background[0].percent, 0.0);
        assert_eq!(animation.background[1].percent, 100.0);
        assert_eq!(animation.background[1].look, look.wash);
        assert_eq!(animation.glow[1].look, look.glow);
        assert_eq!(animation.beam[1].look, look.beam);
        assert_eq!(animation.glow[0].look, animation.glow[1].look);
    }

    #[test]
    fn keyframes_follow_elapsed_time_and_loop_to_first_cue() {
        let cues = vec![
            LightCue::new([255, 0, 0], 1.0, Some(0.9)),
            LightCue::new([0, 255, 0], 3.0, Some(0.1)),
        ];
        let animation = render_animation(&cues);
        let percents: Vec<f64> = animation.glow.iter().map(|frame| frame.percent).collect();
        assert_eq!(percents, vec![0.0, 25.0, 100.0]);
        assert_eq!(animation.total_duration, 4.0);
        assert_eq!(animation.beam[2].look.rgb, [255, 0, 0]);
        assert_eq!(animation.glow[1].look.blur_px, 94);
    }

    #[test]
    fn zero_duration_cycle_uses_one_second() {
        let cues = vec![
            LightCue::new([1, 2, 3], 0.0, None),
            LightCue::new([4, 5, 6], 0.0, None),
        ];
        let animation = render_animation(&cues);
        assert_eq!(animation.total_duration, 1.0);
        assert!(animation.background[..2].iter().all(|frame| frame.percent == 0.0));
    }

    #[test]
    fn out_of_range_intensities_are_clamped() {
        let hot = CueLook::from_cue(&LightCue::new([0, 0, 0], 1.0, Some(2.5)));
        assert_eq!(hot.wash.alpha, WASH_ALPHA_RANGE.1);
        assert_eq!(hot.glow.alpha, 0.75);
        assert_eq!(hot.glow.opacity, 0.8);
        assert_eq!(hot.beam.opacity, BEAM_OPACITY_RANGE.1);
        assert_eq!(hot.glow.blur_px, 430);

        let cold = CueLook::from_cue(&LightCue::new([0, 0, 0], 1.0, Some(-1.0)));
        assert_eq!(cold.wash.alpha, WASH_ALPHA_RANGE.0);
        assert_eq!(cold.glow.alpha, 0.0);
        assert_eq!(cold.glow.opacity, 0.0);
        assert_eq!(cold.beam.alpha, 0.0);
        assert_eq!(cold.glow.blur_px, 0);
    }

    #[test]
    fn default_intensity_drives_mid_values() {
        let look = CueLook::from_cue(&LightCue::new([9, 9, 9], 1.0, None));
        assert!((look.wash.alpha - 0.65).abs() < 1e-9);
        assert_eq!(look.glow.blur_px, 150);
        assert!((look.beam.opacity - 0.45).abs() < 1e-9);
    }
}
