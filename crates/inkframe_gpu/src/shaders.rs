//! WGSL programs
//!
//! Material programs share [`MATERIAL_PRELUDE`] (quad vertex stage and
//! stencil sampling) and add a fragment stage. Effect programs share
//! [`EFFECT_PRELUDE`] (fullscreen vertex stage and layer sampling). All
//! programs read and write premultiplied RGBA.

/// Quad vertex stage and stencil helpers for material programs
pub const MATERIAL_PRELUDE: &str = r#"
struct MaterialUniforms {
    camera: mat4x4<f32>,
    transform: mat4x4<f32>,
    pattern_transform: mat4x4<f32>,
    params: array<vec4<f32>, 4>,
    channel: u32,
    channel_mask: u32,
    alpha: f32,
    _pad: f32,
}

@group(0) @binding(0) var<uniform> material: MaterialUniforms;
@group(0) @binding(1) var stencil_texture: texture_2d<f32>;
@group(0) @binding(2) var stencil_sampler: sampler;
@group(0) @binding(3) var pattern_texture: texture_2d<f32>;
@group(0) @binding(4) var pattern_sampler: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-0.5, -0.5),
        vec2<f32>(0.5, -0.5),
        vec2<f32>(0.5, 0.5),
        vec2<f32>(0.5, 0.5),
        vec2<f32>(-0.5, 0.5),
        vec2<f32>(-0.5, -0.5),
    );
    let p = corners[vertex_index];
    var out: VertexOutput;
    out.position = material.camera * material.transform * vec4<f32>(p, 0.0, 1.0);
    out.uv = p + vec2<f32>(0.5, 0.5);
    return out;
}

// Stroke coverage without the fill bit excludes the glyph interior
fn stencil_coverage(uv: vec2<f32>) -> f32 {
    let texel = textureSample(stencil_texture, stencil_sampler, uv);
    if material.channel == 1u {
        if (material.channel_mask & 2u) == 0u {
            return texel.r * (1.0 - texel.g);
        }
        return texel.r;
    }
    return texel.g;
}

fn premultiply(color: vec4<f32>) -> vec4<f32> {
    return vec4<f32>(color.rgb * color.a, color.a);
}
"#;

/// Solid color: `params[0]` is the straight-alpha color
pub const COLOR_MATERIAL: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let coverage = stencil_coverage(in.uv) * material.alpha;
    return premultiply(material.params[0]) * coverage;
}
"#;

/// Repeating pattern texture mapped through `pattern_transform`
pub const PATTERN_MATERIAL: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let pattern_uv = (material.pattern_transform * vec4<f32>(in.uv, 0.0, 1.0)).xy;
    let color = textureSample(pattern_texture, pattern_sampler, pattern_uv);
    let coverage = stencil_coverage(in.uv) * material.alpha;
    return color * coverage;
}
"#;

/// Bilinear blend of four corner colors (top-left, top-right, bottom-right, bottom-left)
pub const GRADIENT4_MATERIAL: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let coverage = stencil_coverage(in.uv) * material.alpha;
    let colors = material.params;
    let top = mix(colors[0], colors[1], in.uv.x);
    let bottom = mix(colors[3], colors[2], in.uv.x);
    return premultiply(mix(top, bottom, in.uv.y)) * coverage;
}
"#;

/// Fullscreen quad generated from the vertex index
pub const FULLSCREEN_VERTEX: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
    );
    let p = positions[vertex_index];
    var out: VertexOutput;
    out.position = vec4<f32>(p, 0.0, 1.0);
    out.uv = vec2<f32>(p.x * 0.5 + 0.5, 0.5 - p.y * 0.5);
    return out;
}
"#;

/// One separable Gaussian pass over the source alpha
///
/// The horizontal pass keeps plain coverage; the vertical pass (`tint = 1`)
/// turns it into the tinted shadow.
pub const BLUR_SHADER: &str = r#"
struct BlurUniforms {
    color: vec4<f32>,
    resolution: vec2<f32>,
    direction: vec2<f32>,
    sigma: f32,
    extent: f32,
    saturation: f32,
    tint: u32,
}

@group(0) @binding(0) var<uniform> blur: BlurUniforms;
@group(0) @binding(1) var source_texture: texture_2d<f32>;
@group(0) @binding(2) var source_sampler: sampler;

const MAX_TAPS: f32 = 64.0;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let uv = in.position.xy / blur.resolution;
    var coverage = 0.0;
    if blur.extent < 0.5 || blur.sigma <= 0.0 {
        coverage = textureSampleLevel(source_texture, source_sampler, uv, 0.0).a;
    } else {
        let taps = min(ceil(blur.extent), MAX_TAPS);
        let step = blur.extent / taps;
        let texel = blur.direction / blur.resolution;
        let denominator = 2.0 * blur.sigma * blur.sigma;
        var total = 0.0;
        var weights = 0.0;
        for (var i = -taps; i <= taps; i = i + 1.0) {
            let offset = i * step;
            let weight = exp(-(offset * offset) / denominator);
            let texel_alpha = textureSampleLevel(source_texture, source_sampler, uv + texel * offset, 0.0).a;
            total = total + texel_alpha * weight;
            weights = weights + weight;
        }
        coverage = total / weights;
    }

    if blur.tint == 0u {
        return vec4<f32>(0.0, 0.0, 0.0, coverage);
    }
    let alpha = clamp(coverage * blur.saturation, 0.0, 1.0) * blur.color.a;
    return vec4<f32>(blur.color.rgb * alpha, alpha);
}
"#;

/// Layer sampling helpers for effect programs
pub const EFFECT_PRELUDE: &str = r#"
struct EffectUniforms {
    resolution: vec2<f32>,
    _pad: vec2<f32>,
    params: array<vec4<f32>, 2>,
}

@group(0) @binding(0) var<uniform> effect: EffectUniforms;
@group(0) @binding(1) var layer_texture: texture_2d<f32>;
@group(0) @binding(2) var layer_sampler: sampler;

fn sample_at(coord: vec2<f32>) -> vec4<f32> {
    return textureSampleLevel(layer_texture, layer_sampler, coord / effect.resolution, 0.0);
}

fn unpremultiply(color: vec4<f32>) -> vec4<f32> {
    if color.a <= 0.0 {
        return vec4<f32>(0.0);
    }
    return vec4<f32>(color.rgb / color.a, color.a);
}

fn premultiply(color: vec4<f32>) -> vec4<f32> {
    return vec4<f32>(color.rgb * color.a, color.a);
}

// Radial falloff: 1 at the centre, 0 at and beyond the radius
fn falloff(dist: f32, radius: f32) -> f32 {
    if radius <= 0.0 || dist >= radius {
        return 0.0;
    }
    let k = 1.0 - dist / radius;
    return k * k;
}
"#;

pub const PASSTHROUGH_EFFECT: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return sample_at(in.position.xy);
}
"#;

/// params[0] = (cell radius, min alpha, max alpha, -)
pub const NOISE_EFFECT: &str = r#"
fn hash(p: vec2<f32>) -> f32 {
    return fract(sin(dot(p, vec2<f32>(12.9898, 78.233))) * 43758.5453);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let settings = effect.params[0];
    let cell = floor(in.position.xy / max(settings.x, 1.0));
    let alpha = mix(settings.y, settings.z, hash(cell));
    return sample_at(in.position.xy) * alpha;
}
"#;

/// params[0] = (center x, center y, radius, strength)
pub const BULGE_EFFECT: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let settings = effect.params[0];
    let d = in.position.xy - settings.xy;
    let k = falloff(length(d), settings.z);
    return sample_at(settings.xy + d * (1.0 - settings.w * k));
}
"#;

/// params[0] = (center x, center y, radius, strength)
pub const PINCH_EFFECT: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let settings = effect.params[0];
    let d = in.position.xy - settings.xy;
    let k = falloff(length(d), settings.z);
    return sample_at(settings.xy + d * (1.0 + settings.w * k));
}
"#;

/// params[0] = (center x, center y, radius, angle in radians)
pub const SWIRL_EFFECT: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let settings = effect.params[0];
    let d = in.position.xy - settings.xy;
    let theta = settings.w * falloff(length(d), settings.z);
    let s = sin(theta);
    let c = cos(theta);
    let rotated = vec2<f32>(d.x * c - d.y * s, d.x * s + d.y * c);
    return sample_at(settings.xy + rotated);
}
"#;

/// params[0] = (cell size, -, -, -)
pub const PIXELATION_EFFECT: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let size = max(effect.params[0].x, 1.0);
    let coord = (floor(in.position.xy / size) + vec2<f32>(0.5, 0.5)) * size;
    return sample_at(coord);
}
"#;

/// params[0] = (brightness, contrast, -, -)
pub const BRIGHTNESS_CONTRAST_EFFECT: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let settings = effect.params[0];
    let color = unpremultiply(sample_at(in.position.xy));
    let shifted = color.rgb + vec3<f32>(settings.x);
    let rgb = (shifted - vec3<f32>(0.5)) * (1.0 + settings.y) + vec3<f32>(0.5);
    return premultiply(vec4<f32>(clamp(rgb, vec3<f32>(0.0), vec3<f32>(1.0)), color.a));
}
"#;

/// params[0] = (temperature, strength, -, -)
pub const TEMPERATURE_EFFECT: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let settings = effect.params[0];
    let color = unpremultiply(sample_at(in.position.xy));
    let shift = vec3<f32>(0.1, 0.0, -0.1) * settings.x;
    let warmed = clamp(color.rgb + shift, vec3<f32>(0.0), vec3<f32>(1.0));
    return premultiply(vec4<f32>(mix(color.rgb, warmed, settings.y), color.a));
}
"#;

/// Blend and compose a layer onto a backdrop
///
/// Blend modes follow the W3C Compositing and Blending definitions on un-premultiplied colors;
/// code 17 is the bitwise XOR of 8-bit channels. Compose modes are the
/// Porter-Duff operators with `co = as·Fa·Cs' + ab·Fb·Cb`.
pub const BLEND_SHADER: &str = r#"
struct BlendUniforms {
    resolution: vec2<f32>,
    blend_mode: u32,
    compose_mode: u32,
    src_alpha: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
}

@group(0) @binding(0) var<uniform> blend: BlendUniforms;
@group(0) @binding(1) var source_texture: texture_2d<f32>;
@group(0) @binding(2) var backdrop_texture: texture_2d<f32>;
@group(0) @binding(3) var blend_sampler: sampler;

fn unpremultiply_rgb(color: vec4<f32>) -> vec3<f32> {
    if color.a <= 0.0 {
        return vec3<f32>(0.0);
    }
    return clamp(color.rgb / color.a, vec3<f32>(0.0), vec3<f32>(1.0));
}

fn screen(s: f32, d: f32) -> f32 {
    return s + d - s * d;
}

fn hard_light(s: f32, d: f32) -> f32 {
    if s <= 0.5 {
        return 2.0 * s * d;
    }
    return screen(2.0 * s - 1.0, d);
}

fn soft_light(s: f32, d: f32) -> f32 {
    if s <= 0.5 {
        return d - (1.0 - 2.0 * s) * d * (1.0 - d);
    }
    var g = sqrt(d);
    if d <= 0.25 {
        g = ((16.0 * d - 12.0) * d + 4.0) * d;
    }
    return d + (2.0 * s - 1.0) * (g - d);
}

fn blend_channel(mode: u32, s: f32, d: f32) -> f32 {
    switch mode {
        case 1u: { return s * d; }
        case 2u: { return screen(s, d); }
        case 3u: { return hard_light(d, s); }
        case 4u: { return min(s, d); }
        case 5u: { return max(s, d); }
        case 6u: {
            if d <= 0.0 { return 0.0; }
            if s >= 1.0 { return 1.0; }
            return min(1.0, d / (1.0 - s));
        }
        case 7u: {
            if d >= 1.0 { return 1.0; }
            if s <= 0.0 { return 0.0; }
            return 1.0 - min(1.0, (1.0 - d) / s);
        }
        case 8u: { return hard_light(s, d); }
        case 9u: { return soft_light(s, d); }
        case 10u: { return abs(d - s); }
        case 11u: { return s + d - 2.0 * s * d; }
        default: { return s; }
    }
}

fn lum(c: vec3<f32>) -> f32 {
    return dot(c, vec3<f32>(0.3, 0.59, 0.11));
}

fn clip_color(c: vec3<f32>) -> vec3<f32> {
    let l = lum(c);
    let n = min(min(c.r, c.g), c.b);
    let x = max(max(c.r, c.g), c.b);
    var result = c;
    if n < 0.0 {
        result = vec3<f32>(l) + (result - vec3<f32>(l)) * l / (l - n);
    }
    if x > 1.0 {
        result = vec3<f32>(l) + (result - vec3<f32>(l)) * (1.0 - l) / (x - l);
    }
    return result;
}

fn set_lum(c: vec3<f32>, l: f32) -> vec3<f32> {
    return clip_color(c + vec3<f32>(l - lum(c)));
}

fn sat(c: vec3<f32>) -> f32 {
    return max(max(c.r, c.g), c.b) - min(min(c.r, c.g), c.b);
}

fn set_sat(c: vec3<f32>, s: f32) -> vec3<f32> {
    let mx = max(max(c.r, c.g), c.b);
    let mn = min(min(c.r, c.g), c.b);
    if mx <= mn {
        return vec3<f32>(0.0);
    }
    return (c - vec3<f32>(mn)) * s / (mx - mn);
}

fn xor_channels(s: vec3<f32>, d: vec3<f32>) -> vec3<f32> {
    let a = vec3<u32>(round(s * 255.0));
    let b = vec3<u32>(round(d * 255.0));
    return vec3<f32>(a ^ b) / 255.0;
}

fn blend_color(mode: u32, cs: vec3<f32>, cb: vec3<f32>) -> vec3<f32> {
    switch mode {
        case 12u: { return set_lum(set_sat(cs, sat(cb)), lum(cb)); }
        case 13u: { return set_lum(set_sat(cb, sat(cs)), lum(cb)); }
        case 14u: { return set_lum(cs, lum(cb)); }
        case 15u: { return set_lum(cb, lum(cs)); }
        case 17u: { return xor_channels(cs, cb); }
        default: {
            return vec3<f32>(
                blend_channel(mode, cs.r, cb.r),
                blend_channel(mode, cs.g, cb.g),
                blend_channel(mode, cs.b, cb.b),
            );
        }
    }
}

fn compose_factors(mode: u32, sa: f32, da: f32) -> vec2<f32> {
    switch mode {
        case 0u: { return vec2<f32>(0.0, 0.0); }
        case 1u: { return vec2<f32>(1.0, 0.0); }
        case 2u: { return vec2<f32>(0.0, 1.0); }
        case 3u: { return vec2<f32>(1.0, 1.0 - sa); }
        case 4u: { return vec2<f32>(1.0 - da, 1.0); }
        case 5u: { return vec2<f32>(da, 0.0); }
        case 6u: { return vec2<f32>(0.0, sa); }
        case 7u: { return vec2<f32>(1.0 - da, 0.0); }
        case 8u: { return vec2<f32>(0.0, 1.0 - sa); }
        case 9u: { return vec2<f32>(da, 1.0 - sa); }
        case 10u: { return vec2<f32>(1.0 - da, sa); }
        case 11u: { return vec2<f32>(1.0 - da, 1.0 - sa); }
        default: { return vec2<f32>(1.0, 1.0); }
    }
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let uv = in.position.xy / blend.resolution;
    let src = textureSample(source_texture, blend_sampler, uv) * blend.src_alpha;
    let dst = textureSample(backdrop_texture, blend_sampler, uv);
    let sa = src.a;
    let da = dst.a;
    let cs = unpremultiply_rgb(src);
    let cb = unpremultiply_rgb(dst);

    let mixed = (1.0 - da) * cs + da * blend_color(blend.blend_mode, cs, cb);
    let f = compose_factors(blend.compose_mode, sa, da);
    let rgb = sa * f.x * mixed + f.y * dst.rgb;
    let alpha = sa * f.x + da * f.y;
    return clamp(vec4<f32>(rgb, alpha), vec4<f32>(0.0), vec4<f32>(1.0));
}
"#;

/// Textured quad with per-corner texture coordinates
pub const IMAGE_SHADER: &str = r#"
struct ImageUniforms {
    camera: mat4x4<f32>,
    transform: mat4x4<f32>,
    tex_coords: array<vec4<f32>, 2>,
    alpha: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
}

@group(0) @binding(0) var<uniform> image: ImageUniforms;
@group(0) @binding(1) var image_texture: texture_2d<f32>;
@group(0) @binding(2) var image_sampler: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var corner_ids = array<u32, 6>(0u, 1u, 2u, 2u, 3u, 0u);
    var corners = array<vec2<f32>, 4>(
        vec2<f32>(-0.5, -0.5),
        vec2<f32>(0.5, -0.5),
        vec2<f32>(0.5, 0.5),
        vec2<f32>(-0.5, 0.5),
    );
    let packed = image.tex_coords;
    var uvs = array<vec2<f32>, 4>(packed[0].xy, packed[0].zw, packed[1].xy, packed[1].zw);

    let corner = corner_ids[vertex_index];
    var out: VertexOutput;
    out.position = image.camera * image.transform * vec4<f32>(corners[corner], 0.0, 1.0);
    out.uv = uvs[corner];
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(image_texture, image_sampler, in.uv) * image.alpha;
}
"#;

/// Full source of a material program
pub fn material_source(fragment: &str) -> String {
    format!("{MATERIAL_PRELUDE}\n{fragment}")
}

/// Full source of an effect program
pub fn effect_source(fragment: &str) -> String {
    format!("{FULLSCREEN_VERTEX}\n{EFFECT_PRELUDE}\n{fragment}")
}

/// Full source of the shadow blur program
pub fn blur_source() -> String {
    format!("{FULLSCREEN_VERTEX}\n{BLUR_SHADER}")
}

/// Full source of the blend program
pub fn blend_source() -> String {
    format!("{FULLSCREEN_VERTEX}\n{BLEND_SHADER}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembled_programs_have_both_stages() {
        let sources = [
            material_source(COLOR_MATERIAL),
            material_source(PATTERN_MATERIAL),
            material_source(GRADIENT4_MATERIAL),
            effect_source(PASSTHROUGH_EFFECT),
            effect_source(SWIRL_EFFECT),
            blur_source(),
            blend_source(),
            IMAGE_SHADER.to_string(),
        ];
        for source in &sources {
            assert_eq!(source.matches("fn vs_main").count(), 1);
            assert_eq!(source.matches("fn fs_main").count(), 1);
        }
    }
}
