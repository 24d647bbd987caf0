// Routing benchmarks for the WalletMesh router.
//
// Covers chain-id parsing, JSON-RPC frame parsing, and the full
// wm_call pipeline (session check, permission check, proxy forward) over
// an in-process transport pair.

use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use walletmesh_router::config;
use walletmesh_router::jsonrpc::{RpcMessage, RpcNode};
use walletmesh_router::permissions::PermissionState;
use walletmesh_router::session::SessionRecord;
use walletmesh_router::{
    ChainId, LocalTransport, MemorySessionStore, PolicyPermissionManager, SessionStore,
    WalletRouter,
};

fn bench_chain_id_parse(c: &mut Criterion) {
    c.bench_function("chain_id/parse_eip155", |b| {
        b.iter(|| ChainId::parse("eip155:1").unwrap());
    });
    c.bench_function("chain_id/parse_solana_hash", |b| {
        b.iter(|| ChainId::parse("solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp").unwrap());
    });
}

fn bench_frame_parse(c: &mut Criterion) {
    let frame = serde_json::to_vec(&json!({
        "jsonrpc": "2.0",
        "id": 42,
        "method": "wm_call",
        "params": {
            "session_id": "3b241101-e2bb-4255-8caf-4136c566a962",
            "chain_id": "eip155:1",
            "call": { "method": "eth_accounts" }
        }
    }))
    .unwrap();

    c.bench_function("jsonrpc/parse_request_frame", |b| {
        b.iter(|| RpcMessage::parse(&frame).unwrap());
    });
}

/// Full wm_call round trips per second through router and wallet.
fn bench_wm_call_pipeline(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();

    let chain = ChainId::parse("eip155:1").unwrap();
    let (client, session_id) = rt.block_on(async {
        let (dapp_end, router_end) =
            LocalTransport::pair_with_trusted_origin("https://bench.example");
        let store = Arc::new(MemorySessionStore::new());
        let manager = PolicyPermissionManager::new().with_policy(
            chain.clone(),
            "eth_accounts",
            PermissionState::Allow,
        );
        let sessions: Arc<dyn SessionStore> = Arc::clone(&store);
        let router = WalletRouter::new(router_end, sessions, Arc::new(manager));

        let (router_side, wallet_side) = LocalTransport::pair();
        let wallet = RpcNode::new(wallet_side);
        wallet
            .register_method("eth_accounts", |_ctx, _p| async { Ok(json!(["0xabc"])) })
            .unwrap();
        router.add_wallet(chain.clone(), router_side).unwrap();

        let session = SessionRecord::new("https://bench.example", Duration::from_secs(3600));
        let session_id = session.session_id.clone();
        store.set(session).await.unwrap();

        // Keep the router and wallet alive for the duration of the bench.
        std::mem::forget(router);
        std::mem::forget(wallet);
        (RpcNode::new(dapp_end), session_id)
    });

    let mut group = c.benchmark_group("router/wm_call");
    for batch in [1usize, 10] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            b.iter(|| {
                rt.block_on(async {
                    for _ in 0..batch {
                        client
                            .call_method(
                                config::METHOD_CALL,
                                Some(json!({
                                    "session_id": session_id,
                                    "chain_id": "eip155:1",
                                    "call": { "method": "eth_accounts" }
                                })),
                                None,
                            )
                            .await
                            .unwrap();
                    }
                });
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_chain_id_parse,
    bench_frame_parse,
    bench_wm_call_pipeline,
);
criterion_main!(benches);
