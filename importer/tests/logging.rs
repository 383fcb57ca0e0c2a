//! Operator-facing log lines.

mod common;

use blockfeed_nullables::{BlockGenerator, NullBlockNode};
use blockfeed_types::SourceType;
use common::{config_for, empty_bucket, harness};
use std::sync::Arc;
use tracing_test::traced_test;

#[tokio::test]
#[traced_test]
async fn subscriptions_log_the_start_block_and_node() {
    let mut generator = BlockGenerator::new(1);
    let blocks = generator.blocks(4);
    let a = Arc::new(NullBlockNode::new("a:1").with_blocks(blocks[..2].to_vec()));
    let b = Arc::new(NullBlockNode::new("b:1").with_blocks(blocks));
    let mut config = config_for(&[(a.clone(), 0), (b.clone(), 1)]);
    config.block.source_type = SourceType::BlockNode;
    let h = harness(config, vec![a, b], empty_bucket(), Some(generator.ledger()));

    h.importer.get().await.unwrap();
    assert!(logs_contain("Start streaming block 0 from Node(a:1)"));

    // a has nothing past block 1, so the next pull moves to b
    h.importer.get().await.unwrap();
    assert!(logs_contain("Start streaming block 2 from Node(b:1)"));
    assert_eq!(h.notifier.indices(), vec![0, 1, 2, 3]);

    logs_assert(|lines: &[&str]| {
        let starts: Vec<_> = lines
            .iter()
            .filter(|line| line.contains("Start streaming block"))
            .collect();
        match starts.as_slice() {
            [first, second] if first.contains("block 0 from Node(a:1)")
                && second.contains("block 2 from Node(b:1)") =>
            {
                Ok(())
            }
            other => Err(format!("unexpected subscriptions logged: {other:?}")),
        }
    });
}
