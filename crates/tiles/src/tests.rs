use super::*;

fn tile(z: u8, x: u32, y: u32) -> TileId {
    TileId::new(z, x, y)
}

fn assert_no_overlap_collisions(assignment: &ClipIdAssignment) {
    let entries: Vec<(TileId, ClipId)> = assignment
        .iter()
        .map(|(tile, clip)| (*tile, *clip))
        .collect();
    for (left_tile, left_clip) in &entries {
        for (right_tile, right_clip) in &entries {
            if left_tile == right_tile {
                continue;
            }
            assert!(
                !left_clip.accepts(right_clip.reference),
                "{left_tile} accepts stencil written by {right_tile}: {left_clip:?} vs {right_clip:?}"
            );
        }
    }
}

#[test]
fn parent_and_children_follow_quadtree() {
    let child = tile(3, 5, 6);
    assert_eq!(child.parent(), Some(tile(2, 2, 3)));
    assert_eq!(tile(0, 0, 0).parent(), None);
    assert!(tile(1, 1, 1).is_ancestor_of(&child));
    assert!(!child.is_ancestor_of(&tile(1, 1, 1)));
    assert!(child.overlaps(&tile(1, 1, 1)));
    assert!(!child.overlaps(&tile(3, 5, 7)));
    assert!(tile(2, 2, 3).children().contains(&child));
}

#[test]
#[should_panic(expected = "out of range")]
fn tile_outside_zoom_level_panics() {
    let _ = TileId::new(1, 2, 0);
}

#[test]
fn read_mask_covers_top_bits() {
    assert_eq!(ClipId { reference: 0, length: 0 }.read_mask(), 0);
    assert_eq!(ClipId { reference: 0x80, length: 1 }.read_mask(), 0x80);
    assert_eq!(ClipId { reference: 0x40, length: 3 }.read_mask(), 0xE0);
    assert_eq!(ClipId { reference: 0x01, length: 8 }.read_mask(), 0xFF);
}

#[test]
fn clip_ids_do_not_depend_on_enumeration_order() {
    let tiles = vec![
        tile(2, 1, 1),
        tile(3, 2, 3),
        tile(1, 0, 0),
        tile(3, 3, 3),
        tile(2, 0, 1),
    ];
    let mut reversed = tiles.clone();
    reversed.reverse();
    let mut duplicated = tiles.clone();
    duplicated.extend(tiles.iter().copied());

    let expected = compute_clip_ids(tiles, ClipOverflowPolicy::default());
    assert_eq!(
        compute_clip_ids(reversed, ClipOverflowPolicy::default()),
        expected
    );
    assert_eq!(
        compute_clip_ids(duplicated, ClipOverflowPolicy::default()),
        expected
    );
    assert_eq!(expected.len(), 5);
}

#[test]
fn parent_and_child_never_collide() {
    let parent = tile(4, 8, 8);
    let children = parent.children();
    let mut visible = vec![parent];
    visible.extend(children);
    visible.push(tile(4, 9, 8));

    let assignment = compute_clip_ids(visible, ClipOverflowPolicy::default());
    let parent_clip = assignment.get(&parent).expect("parent clip");
    for child in children {
        let child_clip = assignment.get(&child).expect("child clip");
        assert!(!parent_clip.accepts(child_clip.reference));
        assert!(!child_clip.accepts(parent_clip.reference));
        assert!(child_clip.length > parent_clip.length);
    }
    assert_no_overlap_collisions(&assignment);
}

#[test]
fn untouched_stencil_fails_every_test() {
    let assignment = compute_clip_ids(
        [tile(0, 0, 0), tile(1, 0, 0), tile(1, 1, 1)],
        ClipOverflowPolicy::default(),
    );
    assert!(assignment.iter().all(|(_, clip)| !clip.accepts(0)));
}

#[test]
fn levels_get_fields_from_the_top_bit_down() {
    let assignment = compute_clip_ids(
        [tile(1, 0, 0), tile(2, 0, 0), tile(2, 1, 0), tile(2, 2, 0)],
        ClipOverflowPolicy::default(),
    );
    assert_eq!(
        assignment.get(&tile(1, 0, 0)),
        Some(ClipId {
            reference: 0b1000_0000,
            length: 1
        })
    );
    assert_eq!(
        assignment.get(&tile(2, 0, 0)),
        Some(ClipId {
            reference: 0b0010_0000,
            length: 3
        })
    );
    assert_eq!(
        assignment.get(&tile(2, 2, 0)),
        Some(ClipId {
            reference: 0b0110_0000,
            length: 3
        })
    );
    assert_eq!(assignment.bits_used(), 3);
}

fn deep_stack() -> Vec<TileId> {
    // Nine levels with one tile each need nine bits.
    (0..9u8).map(|z| tile(z, 0, 0)).collect()
}

#[test]
fn overflow_drops_finest_levels_by_default() {
    let assignment = compute_clip_ids(deep_stack(), ClipOverflowPolicy::DropFinestLevels);
    assert_eq!(assignment.len(), 8);
    assert_eq!(assignment.unclipped().copied().collect::<Vec<_>>(), [tile(8, 0, 0)]);
    assert!(assignment.get(&tile(0, 0, 0)).is_some());
    assert_no_overlap_collisions(&assignment);
}

#[test]
fn overflow_can_drop_coarsest_levels() {
    let assignment = compute_clip_ids(deep_stack(), ClipOverflowPolicy::DropCoarsestLevels);
    assert_eq!(assignment.unclipped().copied().collect::<Vec<_>>(), [tile(0, 0, 0)]);
    assert_eq!(
        assignment.get(&tile(1, 0, 0)),
        Some(ClipId {
            reference: 0x80,
            length: 1
        })
    );
    assert_no_overlap_collisions(&assignment);
}

#[test]
fn tile_cover_is_clamped_and_center_first() {
    let bounds = TileBounds {
        min_x: -0.2,
        min_y: 0.3,
        max_x: 0.6,
        max_y: 0.7,
    };
    let cover = tile_cover(2, &bounds);
    assert_eq!(cover.len(), 3 * 2);
    assert!(cover.iter().all(|tile| tile.x <= 2 && (1..=2).contains(&tile.y)));
    assert_eq!(cover[0].x, 0);
    assert!(tile_cover(2, &TileBounds { min_x: 1.2, min_y: 0.0, max_x: 1.5, max_y: 1.0 }).is_empty());
}

#[test]
fn pyramid_substitutes_loaded_parent_while_children_load() {
    let mut pyramid = TilePyramid::new();
    let parent = tile(2, 1, 1);
    pyramid.mark_loaded(parent);
    pyramid.mark_loaded(tile(5, 0, 0));

    let ideal = parent.children();
    let retained = pyramid.retain_cover(&ideal);
    assert_eq!(retained.visible, [parent]);
    assert_eq!(retained.missing.len(), 4);
    assert_eq!(retained.evicted, [tile(5, 0, 0)]);

    for child in ideal {
        pyramid.mark_loading(child);
    }
    pyramid.mark_loaded(ideal[0]);
    let retained = pyramid.retain_cover(&ideal);
    assert_eq!(retained.visible, [parent, ideal[0]]);
    assert!(retained.missing.is_empty());

    for child in ideal {
        pyramid.mark_loaded(child);
    }
    let retained = pyramid.retain_cover(&ideal);
    let mut expected = ideal.to_vec();
    expected.sort();
    assert_eq!(retained.visible, expected);
    assert_eq!(retained.evicted, [parent]);
}

#[test]
fn pyramid_uses_loaded_children_when_zooming_out() {
    let mut pyramid = TilePyramid::new();
    let ideal = tile(1, 0, 0);
    for child in ideal.children() {
        pyramid.mark_loaded(child);
    }
    let retained = pyramid.retain_cover(&[ideal]);
    assert_eq!(retained.visible.len(), 4);
    assert_eq!(retained.missing, [ideal]);
}
