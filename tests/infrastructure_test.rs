//! Test to verify test infrastructure works correctly

mod common;

use common::builders::FrameBuilder;
use pose_pipeline::types::PixelFormat;

#[test]
fn test_infrastructure_setup() {
    // Test that builders work
    let frame = FrameBuilder::new(3, 5)
        .format(PixelFormat::Gray8)
        .fill(2)
        .build();

    assert_eq!(frame.height(), 3);
    assert_eq!(frame.width(), 5);
    assert_eq!(frame.byte_sum(), 30);
}

#[test]
fn test_mock_pool_helper() {
    let pool = common::mock_helpers::create_test_pool(2, &FrameBuilder::new(4, 4).build());
    assert_eq!(pool.len(), 2);
}

#[test]
fn test_wait_until() {
    assert!(common::wait_until(common::test_timeout(), || true));
    assert!(!common::wait_until(std::time::Duration::from_millis(20), || false));
}

#[test]
fn test_float_comparison() {
    common::assert_float_eq(1.0, 1.0000001, 0.001);
}

#[test]
#[should_panic]
fn test_float_comparison_fails() {
    common::assert_float_eq(1.0, 2.0, 0.001);
}
