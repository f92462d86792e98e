//! Continuous testing scenarios, not run in the PR pipeline.

#![cfg(feature = "other")]

use iks_tests::scenarios::run_basic;
use iks_tests::setup;

/// Basic example on both basic version slots, run concurrently.
#[tokio::test]
async fn test_run_basic_example() {
    let ctx = setup::shared();

    run_basic(ctx).await.assert_passed();
}
