use super::animation::LightingAnimation;

pub const OVERLAY_ELEMENT_ID: &str = "synesthetic-dj-lighting";

pub fn rgb_to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

/// `rgba(r, g, b, a)` with `a` forced into `[0, 1]`.
pub fn rgb_to_rgba(rgb: [u8; 3], alpha: f64) -> String {
    let bounded_alpha = alpha.clamp(0.0, 1.0);
    format!(
        "rgba({}, {}, {}, {:.2})",
        rgb[0], rgb[1], rgb[2], bounded_alpha
    )
}

pub fn encode_keyframes(animation: &LightingAnimation) -> String {
    if animation.is_empty() {
        return String::new();
    }

    let background = animation
        .background
        .iter()
        .map(|frame| {
            format!(
                "{:.1}% {{ background: radial-gradient(circle at 50% 50%, {} 0%, rgba(0, 0, 0, 0.1) 65%, rgba(0, 0, 0, 0.6) 100%); }}",
                frame.percent,
                rgb_to_rgba(frame.look.rgb, frame.look.alpha)
            )
        })
        .collect::<Vec<String>>();
    let glow = animation
        .glow
        .iter()
        .map(|frame| {
            format!(
                "{:.1}% {{ box-shadow: 0 0 {}px {}; opacity: {:.2}; }}",
                frame.percent,
                frame.look.blur_px,
                rgb_to_rgba(frame.look.rgb, frame.look.alpha),
                frame.look.opacity
            )
        })
        .collect::<Vec<String>>();
    let beam = animation
        .beam
        .iter()
        .map(|frame| {
            format!(
                "{:.1}% {{ background: conic-gradient(from {:.1}deg, {} 15%, transparent 60%); opacity: {:.2}; }}",
                frame.percent,
                frame.percent * 3.6,
                rgb_to_rgba(frame.look.rgb, frame.look.alpha),
                frame.look.opacity
            )
        })
        .collect::<Vec<String>>();

    format!(
        "@keyframes synDjBackground {{{}}}@keyframes synDjGlow {{{}}}@keyframes synDjBeam {{{}}}",
        background.join(" "),
        glow.join(" "),
        beam.join(" ")
    )
}

/// Full-page overlay: keyframes, layer styles and the layer markup.
pub fn encode_overlay_html(animation: &LightingAnimation) -> String {
    if animation.is_empty() {
        return String::new();
    }
    let seconds = trim_float(animation.total_duration);
    let id = OVERLAY_ELEMENT_ID;
    format!(
        "<style>{keyframes}\
#{id} {{position: fixed; top: 0; left: 0; width: 100%; height: 100%;\
pointer-events: none; z-index: -2; overflow: hidden;\
animation: synDjBackground {seconds}s ease-in-out infinite;background-size: cover;}}\
#{id} .syn-layer {{position: absolute; inset: -25%; mix-blend-mode: screen;}}\
#{id} .syn-glow {{animation: synDjGlow {seconds}s ease-in-out infinite;border-radius: 45%; filter: blur(80px);}}\
#{id} .syn-beam {{animation: synDjBeam {seconds}s linear infinite;filter: blur(45px);}}\
</style>\
<div id='{id}'><div class='syn-layer syn-glow'></div><div class='syn-layer syn-beam'></div></div>",
        keyframes = encode_keyframes(animation),
    )
}

fn trim_float(value: f64) -> String {
    let text = format!("{value:.6}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
