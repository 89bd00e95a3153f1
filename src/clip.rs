//! Near-plane clipping of packed strip/triangle streams.
//!
//! Vertices arrive already projected (`x/w`, `y/w`, `1/w`). A vertex is in front of the near plane
//! when `1/z >= near_z`. Each chunk is walked with a three-vertex window; a rolling bitmask of which
//! window vertices are inside selects what to emit so the output stays a valid triangle strip.

use glam::{Vec2, Vec3};

use crate::{index_stream::{chunks, Chunk}, renderer::VertexSink};

/// A transformed vertex ready for submission to the rasterizer
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenVertex {
    /// Projected x & y, with `z` holding `1/w`
    pub position: Vec3,
    pub uv: Vec2,
    /// Packed ARGB
    pub color: u32,
}

impl ScreenVertex {
    #[inline]
    pub fn is_inside(&self, near_z: f32) -> bool {
        1.0 / self.position.z >= near_z
    }
}

fn lerp_color(a: u32, b: u32, t: f32) -> u32 {
    let mut out = 0u32;
    for shift in [0, 8, 16, 24] {
        let ca = ((a >> shift) & 0xFF) as f32;
        let cb = ((b >> shift) & 0xFF) as f32;
        let c = (ca + (cb - ca) * t) as u8;
        out |= (c as u32) << shift;
    }
    out
}

/// Point where the edge `p -> q` crosses the near plane, interpolated in clip space
pub fn intersect(p: &ScreenVertex, q: &ScreenVertex, near_z: f32) -> ScreenVertex {
    let pw = 1.0 / p.position.z;
    let qw = 1.0 / q.position.z;
    let t = (pw - near_z) / (pw - qw);

    let z = 1.0 / (pw + (qw - pw) * t);
    let x = (p.position.x * pw + (q.position.x * qw - p.position.x * pw) * t) * z;
    let y = (p.position.y * pw + (q.position.y * qw - p.position.y * pw) * t) * z;

    ScreenVertex {
        position: Vec3::new(x, y, z),
        uv: p.uv + (q.uv - p.uv) * t,
        color: lerp_color(p.color, q.color, t),
    }
}

struct Emitter<'a, S: VertexSink + ?Sized> {
    sink: &'a mut S,
    near_z: f32,
    count: usize,
}

impl<'a, S: VertexSink + ?Sized> Emitter<'a, S> {
    fn vert(&mut self, v: &ScreenVertex, end_of_strip: bool) {
        self.sink.submit(v, end_of_strip);
        self.count += 1;
    }

    fn inter(&mut self, p: &ScreenVertex, q: &ScreenVertex, end_of_strip: bool) {
        let v = intersect(p, q, self.near_z);
        self.sink.submit(&v, end_of_strip);
        self.count += 1;
    }
}

fn chunk_in_range(chunk: &Chunk, vertex_count: usize) -> bool {
    (0..chunk.len()).all(|i| (chunk.index(i) as usize) < vertex_count)
}

/// Run `f` over every drawable chunk of a mesh. Meshes without indices draw each vertex triple.
pub(crate) fn for_each_chunk<F: FnMut(&Chunk)>(indices: &[u32], vertex_count: usize, mut f: F) {
    if indices.is_empty() {
        for t in 0..vertex_count / 3 {
            let base = (t * 3) as u32;
            f(&Chunk::Triangle([base, base + 1, base + 2]));
        }
        return;
    }

    for chunk in chunks(indices) {
        // strips need at least one full triangle
        if chunk.len() < 3 || !chunk_in_range(&chunk, vertex_count) {
            continue;
        }
        f(&chunk);
    }
}

fn clip_chunk<S: VertexSink + ?Sized>(verts: &[ScreenVertex], chunk: &Chunk, out: &mut Emitter<S>) {
    let near_z = out.near_z;
    let len = chunk.len();
    let v = |i: usize| &verts[chunk.index(i) as usize];

    // first and second point
    let mut clip: u32 = match (v(0).is_inside(near_z), v(1).is_inside(near_z)) {
        (true, true) => {
            out.vert(v(0), false);
            out.vert(v(1), false);
            3
        }
        (true, false) => {
            out.vert(v(0), false);
            out.inter(v(0), v(1), false);
            1
        }
        (false, true) => {
            out.inter(v(0), v(1), false);
            out.vert(v(1), false);
            2
        }
        (false, false) => 0,
    };

    // third point and onwards
    for sub_i in 3..=len {
        let eos = sub_i == len;
        let a = v(sub_i - 3);
        let b = v(sub_i - 2);
        let c = v(sub_i - 1);

        if c.is_inside(near_z) {
            clip |= 1 << 2;
        }

        match clip {
            // a in, b & c out
            1 => {
                out.inter(c, a, true);
            }
            // b in, a & c out
            2 => {
                out.inter(b, c, eos);
            }
            // a & b in, c out
            3 => {
                out.inter(c, a, false);
                out.vert(b, false);
                out.inter(b, c, eos);
            }
            // c in, a & b out
            4 => {
                out.inter(c, a, false);
                if sub_i & 1 == 0 {
                    // keep strip winding
                    out.inter(c, a, false);
                }
                out.inter(b, c, false);
                out.vert(c, eos);
            }
            // a & c in, b out
            5 => {
                out.vert(c, false);
                out.inter(b, c, false);
                out.vert(c, eos);
            }
            // b & c in, a out
            6 => {
                out.inter(c, a, false);
                out.vert(b, false);
                out.vert(c, eos);
            }
            // all in
            7 => {
                out.vert(c, eos);
            }
            _ => {}
        }

        clip >>= 1;
    }
}

/// Clip a mesh's index stream against the near plane, feeding the surviving geometry to `sink`.
/// Returns the number of vertices submitted.
pub fn clip_indexed<S: VertexSink + ?Sized>(verts: &[ScreenVertex], indices: &[u32], near_z: f32, sink: &mut S) -> usize {
    let mut out = Emitter { sink, near_z, count: 0 };

    for_each_chunk(indices, verts.len(), |chunk| {
        clip_chunk(verts, chunk, &mut out);
    });

    out.count
}

/// Submit a mesh's index stream without clipping. Returns the number of vertices submitted.
pub fn submit_indexed<S: VertexSink + ?Sized>(verts: &[ScreenVertex], indices: &[u32], sink: &mut S) -> usize {
    let mut count = 0;

    for_each_chunk(indices, verts.len(), |chunk| {
        let len = chunk.len();
        for i in 0..len {
            sink.submit(&verts[chunk.index(i) as usize], i == len - 1);
        }
        count += len;
    });

    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_stream::encode_strip_index;

    const NEAR: f32 = 0.1;

    #[derive(Default)]
    struct Recorder {
        out: Vec<(ScreenVertex, bool)>,
    }

    impl VertexSink for Recorder {
        fn submit(&mut self, vertex: &ScreenVertex, end_of_strip: bool) {
            self.out.push((*vertex, end_of_strip));
        }
    }

    fn sv(x: f32, y: f32, w: f32) -> ScreenVertex {
        ScreenVertex {
            position: Vec3::new(x / w, y / w, 1.0 / w),
            uv: Vec2::new(x, y),
            color: 0xFFFF_FFFF,
        }
    }

    #[test]
    fn fully_outside_triangle_emits_nothing() {
        let verts = [sv(0.0, 0.0, -1.0), sv(1.0, 0.0, -2.0), sv(0.0, 1.0, 0.05)];
        let mut rec = Recorder::default();
        assert_eq!(clip_indexed(&verts, &[0, 1, 2], NEAR, &mut rec), 0);
        assert!(rec.out.is_empty());
    }

    #[test]
    fn fully_inside_triangle_passes_through() {
        let verts = [sv(0.0, 0.0, 1.0), sv(1.0, 0.0, 2.0), sv(0.0, 1.0, 3.0)];
        let mut rec = Recorder::default();
        assert_eq!(clip_indexed(&verts, &[0, 1, 2], NEAR, &mut rec), 3);

        let emitted: Vec<ScreenVertex> = rec.out.iter().map(|(v, _)| *v).collect();
        assert_eq!(emitted, verts.to_vec());
        assert_eq!(rec.out.iter().map(|(_, e)| *e).collect::<Vec<_>>(), vec![false, false, true]);
    }

    #[test]
    fn single_inside_vertex_yields_sub_triangle() {
        for inside in 0..3 {
            let mut verts = [sv(0.0, 0.0, -1.0), sv(2.0, 0.0, -1.0), sv(0.0, 2.0, -1.0)];
            verts[inside] = sv(1.0, 1.0, 1.0);

            let mut rec = Recorder::default();
            assert_eq!(clip_indexed(&verts, &[0, 1, 2], NEAR, &mut rec), 3, "inside vertex {inside}");
            assert!(rec.out[2].1);

            let originals = rec.out.iter().filter(|(v, _)| *v == verts[inside]).count();
            assert_eq!(originals, 1);

            // intersections sit on the near plane
            for (v, _) in rec.out.iter().filter(|(v, _)| *v != verts[inside]) {
                assert!((1.0 / v.position.z - NEAR).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn intersection_interpolates_in_clip_space() {
        let p = sv(2.0, 4.0, 1.0);
        let q = sv(-2.0, 0.0, -1.0);
        let v = intersect(&p, &q, NEAR);

        // w goes 1 -> -1, crossing 0.1 at t = 0.45
        let t = 0.45;
        let x = 2.0 + (-2.0 - 2.0) * t;
        let y = 4.0 + (0.0 - 4.0) * t;
        assert!(v.position.abs_diff_eq(Vec3::new(x / NEAR, y / NEAR, 1.0 / NEAR), 1e-3));
        assert!(v.uv.abs_diff_eq(Vec2::new(x, y), 1e-5));
    }

    #[test]
    fn color_channels_interpolate_independently() {
        assert_eq!(lerp_color(0xFF00_00FF, 0x00FF_FF00, 0.5), 0x7F7F_7F7F);
        assert_eq!(lerp_color(0x1234_5678, 0x1234_5678, 0.3), 0x1234_5678);
    }

    #[test]
    fn inside_strip_is_submitted_unchanged() {
        let verts = [sv(0.0, 0.0, 1.0), sv(1.0, 0.0, 1.0), sv(0.0, 1.0, 1.0), sv(1.0, 1.0, 1.0)];
        let stream: Vec<u32> = (0..4).map(|i| encode_strip_index(3, i)).collect();

        let mut clipped = Recorder::default();
        let mut fast = Recorder::default();
        assert_eq!(clip_indexed(&verts, &stream, NEAR, &mut clipped), 4);
        assert_eq!(submit_indexed(&verts, &stream, &mut fast), 4);
        assert_eq!(clipped.out, fast.out);
        assert!(fast.out[3].1);
    }

    #[test]
    fn short_and_out_of_range_chunks_are_dropped() {
        let verts = [sv(0.0, 0.0, 1.0), sv(1.0, 0.0, 1.0), sv(0.0, 1.0, 1.0)];
        let stream = [encode_strip_index(1, 0), encode_strip_index(1, 1), 0, 1, 9];

        let mut rec = Recorder::default();
        assert_eq!(submit_indexed(&verts, &stream, &mut rec), 0);
        assert_eq!(clip_indexed(&verts, &stream, NEAR, &mut rec), 0);
    }

    // vertex i sits at x = i, one unit in front of the eye when inside & one unit behind when not
    fn strip_verts(inside: &[bool]) -> Vec<ScreenVertex> {
        inside.iter().enumerate()
            .map(|(i, &v)| sv(i as f32, (i % 2) as f32, if v { 1.0 } else { -1.0 }))
            .collect()
    }

    fn clip_strip(verts: &[ScreenVertex]) -> Vec<(ScreenVertex, bool)> {
        let stream: Vec<u32> = (0..verts.len() as u32).map(|i| encode_strip_index(1, i)).collect();
        let mut rec = Recorder::default();
        let count = clip_indexed(verts, &stream, NEAR, &mut rec);
        assert_eq!(count, rec.out.len());
        rec.out
    }

    #[test]
    fn strip_walks_every_window_state() {
        // windows (a, b, c) from index 3 on: 2, 5, 6, 7, 3, 1, 0, then 4 at an even position
        let o = false;
        let i = true;
        let v = strip_verts(&[o, i, o, i, i, i, o, o, o, i]);
        let x = |p: usize, q: usize| intersect(&v[p], &v[q], NEAR);

        let expected = vec![
            // first pair: out, in
            (x(0, 1), false), (v[1], false),
            // b in
            (x(1, 2), false),
            // a & c in
            (v[3], false), (x(2, 3), false), (v[3], false),
            // b & c in
            (x(4, 2), false), (v[3], false), (v[4], false),
            // all in
            (v[5], false),
            // a & b in
            (x(6, 4), false), (v[5], false), (x(5, 6), false),
            // a in: always closes the strip
            (x(7, 5), true),
            // none in: nothing
            // c in at an even position repeats the first intersection to keep winding
            (x(9, 7), false), (x(9, 7), false), (x(8, 9), false), (v[9], true),
        ];

        assert_eq!(clip_strip(&v), expected);
    }

    #[test]
    fn reentering_strip_at_odd_position_has_no_repeat() {
        let o = false;
        let i = true;
        let v = strip_verts(&[i, i, o, o, i, i]);
        let x = |p: usize, q: usize| intersect(&v[p], &v[q], NEAR);

        let expected = vec![
            (v[0], false), (v[1], false),
            // a & b in
            (x(2, 0), false), (v[1], false), (x(1, 2), false),
            // a in
            (x(3, 1), true),
            // c in at an odd position
            (x(4, 2), false), (x(3, 4), false), (v[4], false),
            // b & c in, last window closes the strip
            (x(5, 3), false), (v[4], false), (v[5], true),
        ];

        assert_eq!(clip_strip(&v), expected);
    }

    #[test]
    fn three_vertex_strips_close_on_final_window() {
        let o = false;
        let i = true;

        // in, out: first pair emits the vertex then the crossing; a & c in close the strip
        let v = strip_verts(&[i, o, i]);
        let x = |p: usize, q: usize| intersect(&v[p], &v[q], NEAR);
        assert_eq!(clip_strip(&v), vec![
            (v[0], false), (x(0, 1), false),
            (v[2], false), (x(1, 2), false), (v[2], true),
        ]);

        // b in on the final window closes with its exit crossing
        let v = strip_verts(&[o, i, o]);
        let x = |p: usize, q: usize| intersect(&v[p], &v[q], NEAR);
        assert_eq!(clip_strip(&v), vec![
            (x(0, 1), false), (v[1], false),
            (x(1, 2), true),
        ]);
    }

    #[test]
    fn unindexed_meshes_draw_vertex_triples() {
        let verts = [sv(0.0, 0.0, 1.0), sv(1.0, 0.0, 1.0), sv(0.0, 1.0, 1.0), sv(5.0, 5.0, 1.0)];
        let mut rec = Recorder::default();
        assert_eq!(submit_indexed(&verts, &[], &mut rec), 3);
    }
}
