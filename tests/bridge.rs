//! End-to-end tests: the real wasm engine behind the worker thread, driven
//! through the async client.

use std::sync::Arc;
use std::time::Duration;
use wasm_scope::analysis::RequestBody;
use wasm_scope::{
    search, Analyzer, ArtifactId, BridgeError, RemoteException, StyledText, TreeNode, WasmEngine,
};

const CALC: &str = r#"(module $calc
    (memory 1)
    (global $counter (mut i32) (i32.const 0))
    (func $add (param i32 i32) (result i32)
        local.get 0
        local.get 1
        i32.add)
    (func $bump
        global.get $counter
        i32.const 1
        i32.add
        global.set $counter)
    (export "add" (func $add))
    (export "bump" (func $bump)))"#;

async fn start() -> (Analyzer, std::thread::JoinHandle<()>) {
    Analyzer::spawn(WasmEngine::new()).await.unwrap()
}

async fn stop(analyzer: Analyzer, worker: std::thread::JoinHandle<()>) {
    analyzer.shutdown().await.unwrap();
    drop(analyzer);
    worker.join().unwrap();
}

fn assert_contained(node: &TreeNode) {
    for child in &node.children {
        assert!(
            node.range.contains_range(&child.range),
            "{} {:?} not inside {:?}",
            child.raw_name,
            child.range,
            node.range
        );
        assert_contained(child);
    }
}

/// Let fire-and-forget requests reach the worker.
async fn settle() {
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[tokio::test]
async fn load_builds_tree_and_search_finds_names() {
    let (analyzer, worker) = start().await;
    let handle = analyzer.load(CALC.as_bytes().to_vec()).await.unwrap();
    assert!(handle.is_valid());

    let tree = handle.tree();
    assert_eq!(tree.children.len(), 1);
    let module = &tree.children[0];
    assert_eq!(module.display_name, "calc");
    assert_eq!(tree.descendant_count(), handle.items().len());
    // The name section trails the last code entry; the root still spans it.
    let len = handle.source().await.unwrap().len();
    assert_eq!(tree.range.end as usize, len);
    assert_eq!(module.range, tree.range);
    assert_contained(&tree);

    let order: Vec<usize> = tree.iter().filter_map(|n| n.index).collect();
    assert_eq!(order, (0..handle.items().len()).collect::<Vec<_>>());
    assert_eq!(wasm_scope::check_order(handle.items()), Ok(()));

    let matches = search(&tree, "bump");
    let best = &matches[0];
    assert_eq!(best.node.raw_name, "func 1");
    assert_eq!(best.score, 1.0);
    assert_eq!(best.ancestor_names, vec!["calc", "funcs"]);

    let func = tree.iter().find(|n| n.raw_name == "func 0").unwrap();
    let by_offset = search(&tree, &format!("{:#x}", func.range.start));
    assert!(by_offset
        .iter()
        .any(|m| m.node.raw_name == "func 0" && m.score >= 0.5));

    drop(handle);
    stop(analyzer, worker).await;
}

#[tokio::test]
async fn rich_print_is_cached_and_decodes() {
    let (analyzer, worker) = start().await;
    let handle = analyzer.load(CALC.as_bytes().to_vec()).await.unwrap();
    let func = handle
        .items()
        .iter()
        .find(|i| i.raw_name == "func 0")
        .unwrap()
        .range;

    let first = handle.print_rich(func).await.unwrap();
    let second = handle.print_rich(func).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(handle.cached_ranges(), 1);

    let styled = StyledText::from_parts(&first);
    assert!(styled.to_plain().contains("i32.add"), "{}", styled.to_plain());

    let plain = handle.print_plain(func).await.unwrap();
    assert!(plain.contains("i32.add"));
    assert!(!plain.contains("global.set"));

    drop(handle);
    stop(analyzer, worker).await;
}

#[tokio::test]
async fn invalid_module_is_a_usable_handle() {
    let (analyzer, worker) = start().await;
    let bytes = b"\0asm\x01\0\0\0\x05".to_vec();
    let handle = analyzer.load(bytes.clone()).await.unwrap();

    assert!(!handle.is_valid());
    assert!(handle.items().is_empty());
    assert!(handle.tree().children.is_empty());
    assert_eq!(handle.source().await.unwrap(), bytes);

    drop(handle);
    stop(analyzer, worker).await;
}

#[tokio::test]
async fn released_artifact_becomes_unknown() {
    let (analyzer, worker) = start().await;
    let handle = analyzer.load(CALC.as_bytes().to_vec()).await.unwrap();
    let artifact = handle.artifact();
    assert_eq!(analyzer.live_artifacts(), vec![artifact]);

    handle.release().await;
    assert!(analyzer.live_artifacts().is_empty());

    let err = handle.source().await.unwrap_err();
    assert!(err.is_unknown_handle(), "{err:?}");
    assert_eq!(err, BridgeError::Remote(RemoteException::UnknownHandle(artifact)));

    // The worker keeps serving after the failure.
    let other = analyzer.load(CALC.as_bytes().to_vec()).await.unwrap();
    assert_eq!(other.artifact(), ArtifactId(artifact.0 + 1));
    assert!(other.source().await.is_ok());

    drop(handle);
    drop(other);
    stop(analyzer, worker).await;
}

#[tokio::test]
async fn destroy_is_idempotent_on_the_worker() {
    let (analyzer, worker) = start().await;
    let handle = analyzer.load(CALC.as_bytes().to_vec()).await.unwrap();
    let artifact = handle.artifact();

    let transport = analyzer.transport();
    for _ in 0..2 {
        let reply = transport.send(RequestBody::Destroy { artifact }).await.unwrap();
        assert_eq!(reply.name(), "destroyed");
    }

    drop(handle);
    stop(analyzer, worker).await;
}

#[tokio::test]
async fn dropping_last_clone_frees_the_artifact() {
    let (analyzer, worker) = start().await;
    let handle = analyzer.load(CALC.as_bytes().to_vec()).await.unwrap();
    let clone = handle.clone();
    let artifact = handle.artifact();

    drop(handle);
    assert_eq!(analyzer.live_artifacts().len(), 1);
    drop(clone);
    assert!(analyzer.live_artifacts().is_empty());
    settle().await;

    // The posted destroy reached the worker.
    let err = analyzer
        .transport()
        .send(RequestBody::GetSource { artifact })
        .await
        .unwrap_err();
    assert!(err.is_unknown_handle(), "{err:?}");

    stop(analyzer, worker).await;
}

#[tokio::test]
async fn release_all_ends_the_session() {
    let (analyzer, worker) = start().await;
    let a = analyzer.load(CALC.as_bytes().to_vec()).await.unwrap();
    let b = analyzer.load(b"(module)".to_vec()).await.unwrap();
    assert_eq!(analyzer.live_artifacts().len(), 2);

    analyzer.release_all().await;
    assert!(analyzer.live_artifacts().is_empty());
    assert!(a.source().await.unwrap_err().is_unknown_handle());
    assert!(b.source().await.unwrap_err().is_unknown_handle());

    // Dropping after release sends nothing further.
    drop(a);
    drop(b);
    stop(analyzer, worker).await;
}
