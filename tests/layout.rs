use gpu_fft_accuracy::layout::{
    contiguous_stride, packed_length, reverse_dims, walk, DeviceLayout, LogicalLayout,
};
use gpu_fft_accuracy::{Placement, ProblemDescription, TransformKind};
use proptest::prelude::*;

mod common;

// ── Packing ───────────────────────────────────────────────────────────────────

#[test]
fn test_packed_length() {
    assert_eq!(packed_length(1), 1);
    assert_eq!(packed_length(15), 8);
    assert_eq!(packed_length(16), 9);
}

/// A real-forward output's fastest device dimension holds `n/2 + 1` elements.
#[test]
fn test_real_forward_packs_output() {
    let p = common::problem(&[16], TransformKind::RealForward);
    let device = DeviceLayout::from_problem(&p);
    assert_eq!(device.length_cm(), &[16]);
    assert_eq!(device.ilength_cm(), &[16]);
    assert_eq!(device.olength_cm(), &[9]);
    assert_eq!(device.idist(), 16);
    assert_eq!(device.odist(), 9);
}

#[test]
fn test_real_inverse_packs_input() {
    let p = common::problem(&[6, 10], TransformKind::RealInverse);
    let logical = LogicalLayout::new(&p);
    assert_eq!(logical.ilength(), &[6, 6]);
    assert_eq!(logical.olength(), &[6, 10]);
    assert_eq!(logical.istride(), &[6, 1]);
    assert_eq!(logical.idist(), 36);
    assert_eq!(logical.odist(), 60);
}

// ── In-place padding ──────────────────────────────────────────────────────────

#[test]
fn test_in_place_real_forward_pads_input() {
    let p = ProblemDescription::builder([4, 8], TransformKind::RealForward)
        .placement(Placement::InPlace)
        .build()
        .unwrap();
    let logical = LogicalLayout::new(&p);
    assert_eq!(logical.istride(), &[10, 1]);
    assert_eq!(logical.idist(), 40);
    assert_eq!(logical.ostride(), &[5, 1]);
    assert_eq!(logical.odist(), 20);

    let device = logical.to_device();
    assert_eq!(device.length_cm(), &[8, 4]);
    assert_eq!(device.olength_cm(), &[5, 4]);
    assert_eq!(device.istride_cm(), &[1, 10]);
    assert_eq!(device.ostride_cm(), &[1, 5]);
}

#[test]
fn test_in_place_real_1d_distances() {
    let forward = ProblemDescription::builder([16], TransformKind::RealForward)
        .placement(Placement::InPlace)
        .build()
        .unwrap();
    let logical = LogicalLayout::new(&forward);
    assert_eq!(logical.idist(), 18);
    assert_eq!(logical.odist(), 9);

    let inverse = ProblemDescription::builder([16], TransformKind::RealInverse)
        .placement(Placement::InPlace)
        .build()
        .unwrap();
    let logical = LogicalLayout::new(&inverse);
    assert_eq!(logical.idist(), 9);
    assert_eq!(logical.odist(), 18);
}

#[test]
fn test_constrained_strides_are_kept() {
    assert_eq!(contiguous_stride(&[4, 8], &[16, 2], true), vec![16, 2]);
    let p = ProblemDescription::builder([4, 8], TransformKind::ComplexForward)
        .istride([16, 2])
        .build()
        .unwrap();
    let device = DeviceLayout::from_problem(&p);
    assert_eq!(device.istride_cm(), &[2, 16]);
    assert_eq!(device.idist(), 64);
    assert_eq!(device.ostride_cm(), &[1, 8]);
    assert_eq!(device.odist(), 32);
}

// ── Index walking ─────────────────────────────────────────────────────────────

#[test]
fn test_walk_is_row_major() {
    let mut seen = Vec::new();
    walk(&[2, 3], |linear, index| seen.push((linear, index.to_vec())));
    assert_eq!(seen.len(), 6);
    assert_eq!(seen[0], (0, vec![0, 0]));
    assert_eq!(seen[1], (1, vec![0, 1]));
    assert_eq!(seen[3], (3, vec![1, 0]));
    assert_eq!(seen[5], (5, vec![1, 2]));
}

// ── Properties ────────────────────────────────────────────────────────────────

fn problems() -> impl Strategy<Value = ProblemDescription> {
    let kinds = prop_oneof![
        Just(TransformKind::ComplexForward),
        Just(TransformKind::ComplexInverse),
        Just(TransformKind::RealForward),
        Just(TransformKind::RealInverse),
    ];
    let placements = prop_oneof![Just(Placement::InPlace), Just(Placement::NotInPlace)];
    (prop::collection::vec(1usize..=32, 1..=3), kinds, placements, 1usize..=4).prop_map(
        |(lengths, kind, placement, batch)| {
            ProblemDescription::builder(lengths, kind)
                .placement(placement)
                .batch(batch)
                .build()
                .unwrap()
        },
    )
}

proptest! {
    #[test]
    fn prop_layout_is_deterministic(p in problems()) {
        prop_assert_eq!(LogicalLayout::new(&p), LogicalLayout::new(&p));
        prop_assert_eq!(DeviceLayout::from_problem(&p), DeviceLayout::from_problem(&p));
    }

    #[test]
    fn prop_reversal_is_a_bijection(p in problems()) {
        let logical = LogicalLayout::new(&p);
        prop_assert_eq!(logical.to_device().to_logical(), logical.clone());
        prop_assert_eq!(reverse_dims(&reverse_dims(p.lengths())), p.lengths().to_vec());
    }

    #[test]
    fn prop_packed_side_is_half_plus_one(p in problems()) {
        let logical = LogicalLayout::new(&p);
        let last = p.lengths()[p.dims() - 1];
        match p.kind() {
            TransformKind::RealForward => {
                prop_assert_eq!(logical.olength()[p.dims() - 1], last / 2 + 1);
            }
            TransformKind::RealInverse => {
                prop_assert_eq!(logical.ilength()[p.dims() - 1], last / 2 + 1);
            }
            _ => prop_assert_eq!(logical.ilength(), logical.olength()),
        }
    }

    /// Every logical element of every batch lands at a distinct offset.
    #[test]
    fn prop_input_offsets_do_not_overlap(p in problems()) {
        let logical = LogicalLayout::new(&p);
        let mut offsets = Vec::new();
        for b in 0..p.batch() {
            walk(logical.ilength(), |_, index| {
                let off: usize = index.iter().zip(logical.istride()).map(|(i, s)| i * s).sum();
                offsets.push(b * logical.idist() + off);
            });
        }
        let count = offsets.len();
        offsets.sort_unstable();
        offsets.dedup();
        prop_assert_eq!(offsets.len(), count);
    }
}
