mod animation;
mod css;

pub use animation::{
    render_animation, BeamLook, CueLook, GlowLook, Keyframe, LightingAnimation, WashLook,
    BEAM_ALPHA_RANGE, BEAM_OPACITY_RANGE, GLOW_ALPHA_RANGE, GLOW_OPACITY_RANGE, WASH_ALPHA_RANGE,
};
pub use css::{encode_keyframes, encode_overlay_html, rgb_to_hex, rgb_to_rgba, OVERLAY_ELEMENT_ID};
