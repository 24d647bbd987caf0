//! Walkthrough of the full router lifecycle in one process.
//!
//! Wires a dApp-side client node, the router, and two fake wallet backends
//! over in-process transport pairs, then runs the whole story: connect,
//! pre-approved calls, a user-gated call, a bulk call with a failing slot,
//! and disconnect.
//!
//! Run with:
//!   cargo run --example demo

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use walletmesh_router::config;
use walletmesh_router::jsonrpc::RpcNode;
use walletmesh_router::permissions::PermissionState;
use walletmesh_router::{
    ChainId, LocalTransport, MemorySessionStore, PolicyPermissionManager, WalletRouter,
};

const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const CYAN: &str = "\x1b[36m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

fn section(num: u32, title: &str) {
    println!();
    println!("{BOLD}{CYAN}=== Step {num}: {title}{RESET}");
}

fn detail(text: impl AsRef<str>) {
    println!("{DIM}    {}{RESET}", text.as_ref());
}

fn fake_evm_wallet(router: &Arc<WalletRouter>, chain: &ChainId) -> Arc<RpcNode> {
    let (router_side, wallet_side) = LocalTransport::pair();
    let wallet = RpcNode::new(wallet_side);
    wallet
        .register_method("eth_accounts", |_ctx, _p| async { Ok(json!(["0xabc123"])) })
        .unwrap();
    wallet
        .register_method("eth_chainId", |_ctx, _p| async { Ok(json!("0x1")) })
        .unwrap();
    wallet
        .register_method("eth_sendTransaction", |_ctx, _p| async {
            Ok(json!("0xdeadbeef_tx_hash"))
        })
        .unwrap();
    router.add_wallet(chain.clone(), router_side).unwrap();
    wallet
}

fn fake_solana_wallet(router: &Arc<WalletRouter>, chain: &ChainId) -> Arc<RpcNode> {
    let (router_side, wallet_side) = LocalTransport::pair();
    let wallet = RpcNode::new(wallet_side);
    wallet
        .register_method("getBalance", |_ctx, _p| async { Ok(json!(1_500_000_000u64)) })
        .unwrap();
    router.add_wallet(chain.clone(), router_side).unwrap();
    wallet
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let eth = ChainId::parse("eip155:1")?;
    let sol = ChainId::parse("solana:mainnet")?;
    let origin = "https://dapp.example";

    section(1, "Assemble the router");
    let (dapp_end, router_end) = LocalTransport::pair_with_trusted_origin(origin);
    let manager = PolicyPermissionManager::new()
        .with_policy(eth.clone(), "eth_accounts", PermissionState::Allow)
        .with_policy(eth.clone(), "eth_chainId", PermissionState::Allow)
        .with_policy(eth.clone(), "eth_sendTransaction", PermissionState::Ask)
        .with_policy(sol.clone(), "getBalance", PermissionState::Allow)
        .with_grant_callback(|prompt| async move {
            println!(
                "    [wallet ui] {} asks for {:?} on {} -> approved",
                prompt.origin, prompt.methods, prompt.chain_id
            );
            true
        });
    let router = WalletRouter::new(
        router_end,
        Arc::new(MemorySessionStore::new()),
        Arc::new(manager),
    );
    let _evm = fake_evm_wallet(&router, &eth);
    let _solana = fake_solana_wallet(&router, &sol);
    detail(format!("chains online: {:?}", router.chains()));

    let client = RpcNode::new(dapp_end);

    section(2, "Connect and receive a session");
    let connected = client
        .call_method(
            config::METHOD_CONNECT,
            Some(json!({
                "permissions": {
                    "eip155:1": ["eth_accounts", "eth_chainId", "eth_sendTransaction"],
                    "solana:mainnet": ["getBalance"]
                }
            })),
            None,
        )
        .await?;
    let session_id = connected["session_id"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    detail(format!("session: {session_id}"));

    section(3, "Pre-approved calls flow straight through");
    for (chain, method) in [("eip155:1", "eth_accounts"), ("solana:mainnet", "getBalance")] {
        let result = client
            .call_method(
                config::METHOD_CALL,
                Some(json!({
                    "session_id": session_id,
                    "chain_id": chain,
                    "call": { "method": method }
                })),
                None,
            )
            .await?;
        println!("    {GREEN}{chain} {method} -> {result}{RESET}");
    }

    section(4, "An Ask-gated call parks until the user approves");
    let caller = Arc::clone(&client);
    let params = json!({
        "session_id": session_id,
        "chain_id": "eip155:1",
        "call": { "method": "eth_sendTransaction", "params": [{ "to": "0x0", "value": "0x1" }] }
    });
    let parked = tokio::spawn(async move {
        caller
            .call_method(config::METHOD_CALL, Some(params), None)
            .await
    });
    while router.pending_approvals().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let approval = router.pending_approvals().remove(0);
    detail(format!(
        "pending: {} on {} from {}",
        approval.method, approval.chain_id, approval.origin
    ));
    router.resolve_approval(&approval.request_id, true);
    let tx_hash = parked.await??;
    println!("    {GREEN}approved -> {tx_hash}{RESET}");

    section(5, "Bulk call with one bad slot");
    let outcome = client
        .call_method(
            config::METHOD_BULK_CALL,
            Some(json!({
                "session_id": session_id,
                "chain_id": "eip155:1",
                "calls": [
                    { "method": "eth_chainId" },
                    { "method": "eth_totallyMadeUp" }
                ]
            })),
            None,
        )
        .await;
    match outcome {
        Err(err) => detail(format!("partial failure, as expected: {err}")),
        Ok(value) => detail(format!("unexpected full success: {value}")),
    }

    section(6, "Disconnect");
    let done = client
        .call_method(
            config::METHOD_DISCONNECT,
            Some(json!({ "session_id": session_id })),
            None,
        )
        .await?;
    detail(format!("disconnected: {done}"));

    router.close();
    client.close();
    println!();
    println!("{BOLD}{GREEN}Lifecycle complete.{RESET}");
    Ok(())
}
