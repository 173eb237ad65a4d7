use tensorplan::ops::{infer_concat, infer_matmul, infer_transpose};
use tensorplan::utils::{infer_broadcast, normalize_axis, ShapeError};
use tensorplan::{CpuRuntime, DType, Graph, MatmulDims, OpKind, Shape};

#[test]
fn broadcast_aligns_shapes_from_the_trailing_axis() {
    let result = infer_broadcast(&Shape::new([8, 1, 6, 1]), &Shape::new([7, 1, 5]))
        .expect("shapes are broadcastable");
    assert_eq!(result, Shape::new([8, 7, 6, 5]));

    let result =
        infer_broadcast(&Shape::new([5, 4]), &Shape::new([1])).expect("shapes are broadcastable");
    assert_eq!(result, Shape::new([5, 4]));
}

#[test]
fn broadcast_rejects_incompatible_shapes() {
    let err = infer_broadcast(&Shape::new([3, 4]), &Shape::new([5]))
        .expect_err("4 vs 5 cannot broadcast");
    assert!(matches!(err, ShapeError::NotBroadcastable { .. }));
}

#[test]
fn negative_axes_resolve_against_the_rank() {
    assert_eq!(normalize_axis(-1, 3), Ok(2));
    assert_eq!(normalize_axis(1, 3), Ok(1));
    assert!(matches!(
        normalize_axis(3, 3),
        Err(ShapeError::AxisOutOfRange { .. })
    ));
    assert!(matches!(
        normalize_axis(-4, 3),
        Err(ShapeError::AxisOutOfRange { .. })
    ));
}

#[test]
fn matmul_infers_output_shape_and_records_mnk() {
    let (shape, dims) =
        infer_matmul(&Shape::new([2, 3]), &Shape::new([3, 4]), false, false).expect("valid matmul");
    assert_eq!(shape, Shape::new([2, 4]));
    assert_eq!(dims, MatmulDims { m: 2, n: 4, k: 3 });
}

#[test]
fn matmul_honours_transpose_flags() {
    let (shape, dims) =
        infer_matmul(&Shape::new([3, 2]), &Shape::new([4, 3]), true, true).expect("valid matmul");
    assert_eq!(shape, Shape::new([2, 4]));
    assert_eq!(dims, MatmulDims { m: 2, n: 4, k: 3 });
}

#[test]
fn matmul_broadcasts_batch_dimensions() {
    let (shape, _) = infer_matmul(&Shape::new([5, 2, 3]), &Shape::new([1, 3, 4]), false, false)
        .expect("batched matmul broadcasts");
    assert_eq!(shape, Shape::new([5, 2, 4]));

    let (shape, _) = infer_matmul(&Shape::new([7, 1, 2, 3]), &Shape::new([4, 3, 5]), false, false)
        .expect("rank-mismatched batches broadcast");
    assert_eq!(shape, Shape::new([7, 4, 2, 5]));
}

#[test]
fn matmul_rejects_contraction_mismatch() {
    let err = infer_matmul(&Shape::new([2, 3]), &Shape::new([4, 5]), false, false)
        .expect_err("k must agree");
    assert_eq!(err, ShapeError::ContractionMismatch { lhs_k: 3, rhs_k: 4 });
}

#[test]
fn matmul_rejects_vectors() {
    let err = infer_matmul(&Shape::new([3]), &Shape::new([3, 4]), false, false)
        .expect_err("rank must be at least 2");
    assert!(matches!(err, ShapeError::MatmulRankTooLow { .. }));
}

#[test]
fn transpose_permutes_dimensions() {
    let shape = infer_transpose(&Shape::new([2, 3]), &[1, 0]).expect("valid permutation");
    assert_eq!(shape, Shape::new([3, 2]));

    let shape = infer_transpose(&Shape::new([2, 3, 4]), &[2, 0, 1]).expect("valid permutation");
    assert_eq!(shape, Shape::new([4, 2, 3]));
}

#[test]
fn transpose_rejects_invalid_permutations() {
    assert!(infer_transpose(&Shape::new([2, 3]), &[0, 0]).is_err());
    assert!(infer_transpose(&Shape::new([2, 3]), &[0, 2]).is_err());
    assert!(infer_transpose(&Shape::new([2, 3]), &[0]).is_err());
}

#[test]
fn concat_sums_the_concatenated_axis() {
    let shape = infer_concat(&[&Shape::new([2, 3]), &Shape::new([2, 5])], 1)
        .expect("compatible concat inputs");
    assert_eq!(shape, Shape::new([2, 8]));

    let shape = infer_concat(&[&Shape::new([2, 3]), &Shape::new([2, 5])], -1)
        .expect("negative axis resolves to the last");
    assert_eq!(shape, Shape::new([2, 8]));
}

#[test]
fn concat_rejects_mismatched_non_concat_axes() {
    let err = infer_concat(&[&Shape::new([2, 3]), &Shape::new([4, 5])], 1)
        .expect_err("axis 0 must agree");
    assert_eq!(
        err,
        ShapeError::AxisMismatch {
            axis: 0,
            expected: 2,
            got: 4
        }
    );
}

#[test]
fn shape_infer_overwrites_stale_output_shapes_by_fuid() {
    let mut graph = Graph::new(CpuRuntime::new());
    let a = graph.add_tensor([2, 3], DType::F32);
    let b = graph.add_tensor([3, 4], DType::F32);
    // Deliberately wrong placeholder shape; inference must fix it.
    let c = graph.add_tensor([1], DType::F32);
    let matmul = graph.add_op(OpKind::matmul(false, false), &[a, b], &[c]);

    graph.shape_infer();
    assert_eq!(graph.tensor(c).shape(), &Shape::new([2, 4]));
    match graph.op(matmul).kind() {
        OpKind::MatMul { dims, .. } => assert_eq!(*dims, MatmulDims { m: 2, n: 4, k: 3 }),
        kind => panic!("unexpected kind {kind:?}"),
    }
}

#[test]
fn shape_infer_propagates_through_a_chain() {
    let mut graph = Graph::new(CpuRuntime::new());
    let a = graph.add_tensor([2, 3], DType::F32);
    let b = graph.add_tensor([1], DType::F32);
    let c = graph.add_tensor([1], DType::F32);
    graph.add_op(OpKind::transpose([1, 0]), &[a], &[b]);
    graph.add_op(OpKind::concat(0), &[b], &[c]);
    graph.topo_sort().expect("acyclic graph must sort");

    graph.shape_infer();
    assert_eq!(graph.tensor(b).shape(), &Shape::new([3, 2]));
    assert_eq!(graph.tensor(c).shape(), &Shape::new([3, 2]));
}

#[test]
#[should_panic(expected = "shape inference failed")]
fn incompatible_shapes_fail_loudly_during_graph_inference() {
    let mut graph = Graph::new(CpuRuntime::new());
    let a = graph.add_tensor([2, 3], DType::F32);
    let b = graph.add_tensor([4, 5], DType::F32);
    let c = graph.add_tensor([1], DType::F32);
    graph.add_op(OpKind::matmul(false, false), &[a, b], &[c]);
    graph.shape_infer();
}
