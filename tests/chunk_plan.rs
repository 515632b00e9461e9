mod common;

use bug_digest::{
    chunk_plan::{ChunkPlan, Chunks, chunk_count, chunks},
    config::Config,
};

#[test]
fn chunk_count_law() {
    for len in 0..20 {
        let items: Vec<usize> = (0..len).collect();
        for size in 1..8 {
            let parts: Vec<&[usize]> = chunks(&items, size).collect();
            assert_eq!(parts.len(), chunk_count(len, size));
            assert_eq!(parts.len(), len.div_ceil(size));
        }
    }
}

#[test]
fn partition_keeps_order_and_remainder() {
    let items: Vec<u32> = (1..=7).collect();
    let parts: Vec<&[u32]> = chunks(&items, 3).collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], [1, 2, 3]);
    assert_eq!(parts[1], [4, 5, 6]);
    assert_eq!(parts[2], [7]);
    assert_eq!(parts.concat(), items);

    let empty: [u32; 0] = [];
    assert_eq!(chunks(&empty, 3).count(), 0);
    assert_eq!(chunks(&items, 100).count(), 1);
}

#[test]
fn restart_at_offset_reproduces_partition() {
    let items: Vec<u32> = (0..11).collect();
    let full: Vec<&[u32]> = chunks(&items, 4).collect();
    let mut it = chunks(&items, 4);
    it.next();
    assert_eq!(it.position(), 1);
    let resumed: Vec<&[u32]> = Chunks::starting_at(&items, 4, it.position()).collect();
    assert_eq!(resumed, full[1..].to_vec());
    assert_eq!(it.len(), 2);
}

#[test]
fn plan_from_index() {
    let mut cfg = Config::default();
    cfg.chunking.chunk_size = 3;
    let ds = common::load(&cfg, &common::single_group_csv(7));
    let plan = ChunkPlan::from_index(&cfg, &ds.index());

    assert_eq!(plan.total_tasks, 2);
    assert_eq!(plan.total_model_calls, 6);
    assert_eq!(plan.groups[0].component, None);
    assert_eq!(plan.groups[0].chunk_sizes, vec![3, 3, 1]);
    assert_eq!(plan.groups[1].component.as_deref(), Some("Core"));

    cfg.chunking.mode = "all".into();
    let plan = ChunkPlan::from_index(&cfg, &ds.index());
    assert_eq!(plan.total_model_calls, 2);
    assert_eq!(plan.groups[0].chunk_sizes, vec![7]);
}
