//! Transaction Decoder
//!
//! Purpose:
//!     Turn one transaction and its receipt into zero or more normalized
//!     `DecodedAction`s against the active venue universe.
//!
//! Author: AI-Generated
//! Created: 2026-10-19
//!
//! Decoding order:
//!     1. `to` not in the universe → Untracked (cheap short-circuit)
//!     2. failed receipt → Failed, no action. A receipt is required; the
//!        caller skips transactions whose receipt could not be fetched
//!     3. calldata of 1-3 bytes → Malformed
//!     4. intent from the 4-byte function selector, outcomes from every
//!        receipt log's topic0
//!     5. primary action: function-derived, else first non-generic event,
//!        else first generic event; nothing recognized → Unrecognized
//!     6. batch entrypoints emit one action per non-generic event log,
//!        falling back to one action of the function's own type
//!
//! Notes:
//!     - A log emitted by a venue in the universe makes that venue the
//!       action's venue; otherwise the action is against `tx.to`

pub mod arguments;

use crate::chain::{RawLog, RawReceipt, RawTransaction};
use crate::discovery::VenueUniverse;
use crate::registry::{selector_hex, ActionSignature, Selector, SelectorRegistry};
use crate::types::{DecodedAction, FunctionSelector};
use alloy::primitives::Address;
use std::sync::Arc;
use tracing::trace;

pub use arguments::{decode_arguments, Metadata};

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// Target is not a tracked venue (or the tx creates a contract)
    Untracked,
    /// Reverted transaction; counted, never profiled
    Failed,
    Malformed(String),
    /// Tracked target, but neither selector nor any log topic is registered
    Unrecognized,
    Actions(Vec<DecodedAction>),
}

impl DecodeOutcome {
    pub fn actions(&self) -> &[DecodedAction] {
        match self {
            DecodeOutcome::Actions(a) => a,
            _ => &[],
        }
    }
}

/// Block context shared by every transaction of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    pub number: u64,
    pub timestamp: u64,
}

/// A receipt log matched against the event table
struct EventHit<'a> {
    log: &'a RawLog,
    sig: &'a ActionSignature,
}

#[derive(Debug, Clone)]
pub struct TransactionDecoder {
    selectors: Arc<SelectorRegistry>,
}

impl TransactionDecoder {
    pub fn new(selectors: Arc<SelectorRegistry>) -> Self {
        Self { selectors }
    }

    pub fn selectors(&self) -> &SelectorRegistry {
        &self.selectors
    }

    pub fn decode(
        &self,
        tx: &RawTransaction,
        receipt: &RawReceipt,
        block: BlockContext,
        universe: &VenueUniverse,
    ) -> DecodeOutcome {
        let Some(to) = tx.to.filter(|addr| universe.contains(addr)) else {
            return DecodeOutcome::Untracked;
        };
        if !receipt.success {
            return DecodeOutcome::Failed;
        }
        let input = tx.input.as_ref();
        if (1..4).contains(&input.len()) {
            return DecodeOutcome::Malformed(format!(
                "calldata of {} bytes has no selector",
                input.len()
            ));
        }

        let function = self.selectors.lookup_function(input);
        let events: Vec<EventHit<'_>> = receipt
            .logs
            .iter()
            .filter_map(|log| {
                let sig = self.selectors.lookup_event(log.topic0()?)?;
                Some(EventHit { log, sig })
            })
            .collect();

        let builder = ActionBuilder {
            tx,
            receipt,
            block,
            universe,
            to,
            function_selector: function.and_then(|sig| match sig.selector {
                Selector::Function(s) => Some(s),
                Selector::Event(_) => None,
            }),
        };

        let actions = match function {
            Some(sig) if sig.batch => {
                let mut actions: Vec<DecodedAction> = events
                    .iter()
                    .filter(|hit| !hit.sig.action.is_generic())
                    .enumerate()
                    .map(|(i, hit)| builder.event_action(hit, i as u32))
                    .collect();
                if actions.is_empty() {
                    actions.push(builder.function_action(sig, None, 0));
                }
                actions
            }
            Some(sig) => {
                // Prefer a log of the same action for the venue, then any
                // specific one
                let venue_log = events
                    .iter()
                    .find(|hit| hit.sig.action == sig.action && universe.contains(&hit.log.address))
                    .or_else(|| {
                        events
                            .iter()
                            .find(|hit| !hit.sig.action.is_generic() && universe.contains(&hit.log.address))
                    })
                    .map(|hit| hit.log);
                vec![builder.function_action(sig, venue_log, 0)]
            }
            None => {
                let primary = events
                    .iter()
                    .find(|hit| !hit.sig.action.is_generic())
                    .or_else(|| events.first());
                match primary {
                    Some(hit) => vec![builder.event_action(hit, 0)],
                    None => {
                        trace!(
                            "Unrecognized call {} to {} in tx {}",
                            selector_hex(input),
                            to,
                            tx.hash
                        );
                        return DecodeOutcome::Unrecognized;
                    }
                }
            }
        };
        DecodeOutcome::Actions(actions)
    }
}

struct ActionBuilder<'a> {
    tx: &'a RawTransaction,
    receipt: &'a RawReceipt,
    block: BlockContext,
    universe: &'a VenueUniverse,
    to: Address,
    function_selector: Option<FunctionSelector>,
}

impl ActionBuilder<'_> {
    fn venue_for(&self, log: Option<&RawLog>) -> Address {
        match log {
            Some(l) if self.universe.contains(&l.address) => l.address,
            _ => self.to,
        }
    }

    fn base(&self, venue: Address, sig: &ActionSignature, action_index: u32) -> DecodedAction {
        let protocol = self
            .universe
            .get(&venue)
            .map(|v| v.protocol.clone())
            .unwrap_or_else(|| sig.protocol.clone());
        DecodedAction {
            tx_hash: self.tx.hash,
            block_number: self.block.number,
            tx_index: self.tx.tx_index,
            timestamp: self.block.timestamp,
            user: self.tx.from,
            venue,
            protocol,
            action_type: sig.action,
            function_selector: self.function_selector,
            event_selector: None,
            log_index: None,
            action_index,
            gas_used: self.receipt.gas_used,
            gas_price: self.receipt.effective_gas_price,
            value: self.tx.value,
            success: true,
            metadata: Metadata::new(),
        }
    }

    fn function_action(&self, sig: &ActionSignature, log: Option<&RawLog>, action_index: u32) -> DecodedAction {
        let mut action = self.base(self.venue_for(log), sig, action_index);
        action.metadata = decode_arguments(self.tx.input.as_ref());
        action.metadata.insert("function".to_string(), sig.name.clone());
        if let Some(l) = log {
            action.event_selector = l.topic0().copied();
            action.log_index = Some(l.log_index);
        }
        action
    }

    fn event_action(&self, hit: &EventHit<'_>, action_index: u32) -> DecodedAction {
        let mut action = self.base(self.venue_for(Some(hit.log)), hit.sig, action_index);
        action.event_selector = hit.log.topic0().copied();
        action.log_index = Some(hit.log.log_index);
        action.metadata.insert("event".to_string(), hit.sig.name.clone());
        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{log, receipt, tx};
    use crate::contracts::{IERC20, IUniswapV2Pair, IUniswapV2Router02, IUniswapV3Pool};
    use crate::discovery::UniverseMetadata;
    use crate::types::{ActionType, DiscoveredContract};
    use alloy::primitives::aliases::I24;
    use alloy::primitives::{I256, U256};
    use alloy::sol_types::{SolCall, SolEvent};

    const BLOCK: BlockContext = BlockContext {
        number: 18_000_000,
        timestamp: 1_700_000_000,
    };

    fn router() -> Address {
        Address::repeat_byte(0x7a)
    }
    fn pair() -> Address {
        Address::repeat_byte(0x42)
    }
    fn v3_pool() -> Address {
        Address::repeat_byte(0x33)
    }
    fn user() -> Address {
        Address::repeat_byte(0xbb)
    }
    fn token() -> Address {
        Address::repeat_byte(0xcc)
    }

    fn venue(address: Address, protocol: &str, pinned: bool) -> DiscoveredContract {
        DiscoveredContract {
            address,
            protocol: protocol.into(),
            category: "DEX".into(),
            source_factory: (!pinned).then(|| Address::repeat_byte(0xf0)),
            creation_block: 0,
            creation_tx: None,
            metrics: None,
        }
    }

    fn universe() -> VenueUniverse {
        VenueUniverse::new(
            vec![
                venue(router(), "Uniswap V2", true),
                venue(pair(), "Uniswap V2", false),
                venue(v3_pool(), "Uniswap V3", false),
            ],
            UniverseMetadata::default(),
        )
    }

    fn decoder() -> TransactionDecoder {
        TransactionDecoder::new(Arc::new(SelectorRegistry::builtin()))
    }

    fn swap_calldata() -> Vec<u8> {
        IUniswapV2Router02::swapExactTokensForTokensCall {
            amountIn: U256::from(100u64),
            amountOutMin: U256::from(1u64),
            path: vec![token(), Address::repeat_byte(0xdd)],
            to: user(),
            deadline: U256::from(1u64),
        }
        .abi_encode()
    }

    fn v2_swap_log(index: u64) -> RawLog {
        let data = IUniswapV2Pair::Swap {
            sender: router(),
            amount0In: U256::from(100u64),
            amount1In: U256::ZERO,
            amount0Out: U256::ZERO,
            amount1Out: U256::from(99u64),
            to: user(),
        }
        .encode_log_data();
        log(pair(), data.topics().to_vec(), data.data.to_vec(), BLOCK.number, index)
    }

    fn v3_swap_log(index: u64) -> RawLog {
        let data = IUniswapV3Pool::Swap {
            sender: router(),
            recipient: user(),
            amount0: I256::try_from(5i64).unwrap(),
            amount1: I256::try_from(-5i64).unwrap(),
            sqrtPriceX96: Default::default(),
            liquidity: 1,
            tick: I24::ZERO,
        }
        .encode_log_data();
        log(v3_pool(), data.topics().to_vec(), data.data.to_vec(), BLOCK.number, index)
    }

    fn transfer_log(index: u64) -> RawLog {
        let data = IERC20::Transfer {
            from: user(),
            to: pair(),
            value: U256::from(100u64),
        }
        .encode_log_data();
        log(token(), data.topics().to_vec(), data.data.to_vec(), BLOCK.number, index)
    }

    #[test]
    fn test_untracked_target_short_circuits() {
        let t = tx(1, user(), Address::repeat_byte(0x99), swap_calldata(), 0);
        let r = receipt(&t, true, vec![v2_swap_log(0)]);
        assert_eq!(decoder().decode(&t, &r, BLOCK, &universe()), DecodeOutcome::Untracked);

        let mut create = t.clone();
        create.to = None;
        assert_eq!(decoder().decode(&create, &r, BLOCK, &universe()), DecodeOutcome::Untracked);
    }

    #[test]
    fn test_failed_receipt_produces_no_action() {
        let t = tx(1, user(), router(), swap_calldata(), 0);
        let r = receipt(&t, false, vec![v2_swap_log(0)]);
        let outcome = decoder().decode(&t, &r, BLOCK, &universe());
        assert_eq!(outcome, DecodeOutcome::Failed);
        assert!(outcome.actions().is_empty());
    }

    #[test]
    fn test_short_calldata_is_malformed() {
        let t = tx(1, user(), router(), vec![0x38, 0xed, 0x17], 0);
        let r = receipt(&t, true, vec![]);
        assert!(matches!(
            decoder().decode(&t, &r, BLOCK, &universe()),
            DecodeOutcome::Malformed(_)
        ));
    }

    #[test]
    fn test_router_swap_decodes_to_pair_venue() {
        let t = tx(1, user(), router(), swap_calldata(), 3);
        let r = receipt(&t, true, vec![transfer_log(0), v2_swap_log(1)]);
        let outcome = decoder().decode(&t, &r, BLOCK, &universe());
        let actions = outcome.actions();

        assert_eq!(actions.len(), 1);
        let a = &actions[0];
        assert_eq!(a.action_type, ActionType::Swap);
        assert_eq!(a.function_selector, Some(FunctionSelector::from([0x38, 0xed, 0x17, 0x39])));
        assert_eq!(a.venue, pair());
        assert_eq!(a.user, user());
        assert_eq!(a.tx_index, 3);
        assert_eq!(a.log_index, Some(1));
        assert_eq!(a.event_selector, Some(IUniswapV2Pair::Swap::SIGNATURE_HASH));
        assert_eq!(a.metadata["function"], "swapExactTokensForTokens");
        assert_eq!(a.metadata["token_in"], format!("{:#x}", token()));
        assert_eq!(a.gas_used, 120_000);
        assert_eq!(a.timestamp, BLOCK.timestamp);
    }

    #[test]
    fn test_unknown_selector_falls_back_to_specific_event() {
        let t = tx(1, user(), router(), vec![0xde, 0xad, 0xbe, 0xef], 0);
        let r = receipt(&t, true, vec![transfer_log(0), v2_swap_log(1)]);
        let actions = decoder().decode(&t, &r, BLOCK, &universe()).actions().to_vec();

        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::Swap);
        assert_eq!(actions[0].function_selector, None);
        assert_eq!(actions[0].venue, pair());
        assert_eq!(actions[0].metadata["event"], "Swap");
    }

    #[test]
    fn test_generic_event_used_only_as_last_resort() {
        let t = tx(1, user(), router(), vec![], 0);
        let r = receipt(&t, true, vec![transfer_log(4)]);
        let actions = decoder().decode(&t, &r, BLOCK, &universe()).actions().to_vec();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::Transfer);
        // Token is not a venue; the action stays on the router
        assert_eq!(actions[0].venue, router());
    }

    #[test]
    fn test_nothing_recognized() {
        let t = tx(1, user(), router(), vec![0xde, 0xad, 0xbe, 0xef], 0);
        let r = receipt(&t, true, vec![]);
        assert_eq!(decoder().decode(&t, &r, BLOCK, &universe()), DecodeOutcome::Unrecognized);
    }

    #[test]
    fn test_every_function_selector_decodes_to_its_action() {
        let d = decoder();
        let mut checked = 0;
        for sig in d.selectors().signatures() {
            let Selector::Function(selector) = sig.selector else {
                continue;
            };
            let t = tx(1, user(), router(), selector.to_vec(), 0);
            let r = receipt(&t, true, vec![]);
            let actions = d.decode(&t, &r, BLOCK, &universe()).actions().to_vec();
            assert_eq!(actions.len(), 1, "{}", sig.signature);
            assert_eq!(actions[0].action_type, sig.action, "{}", sig.signature);
            assert_eq!(actions[0].function_selector, Some(selector), "{}", sig.signature);
            checked += 1;
        }
        assert!(checked > 30);
    }

    #[test]
    fn test_every_event_topic_decodes_without_function() {
        let d = decoder();
        let mut checked = 0;
        for sig in d.selectors().signatures() {
            let Selector::Event(topic) = sig.selector else {
                continue;
            };
            let t = tx(1, user(), router(), vec![0xde, 0xad, 0xbe, 0xef], 0);
            let r = receipt(&t, true, vec![log(pair(), vec![topic], vec![], BLOCK.number, 7)]);
            let actions = d.decode(&t, &r, BLOCK, &universe()).actions().to_vec();
            assert_eq!(actions.len(), 1, "{}", sig.signature);
            assert_eq!(actions[0].action_type, sig.action, "{}", sig.signature);
            assert_eq!(actions[0].event_selector, Some(topic), "{}", sig.signature);
            assert_eq!(actions[0].venue, pair(), "{}", sig.signature);
            assert_eq!(actions[0].log_index, Some(7));
            checked += 1;
        }
        assert!(checked > 15);
    }

    #[test]
    fn test_batch_emits_one_action_per_specific_event() {
        let inner = vec![swap_calldata().into()];
        let input = crate::contracts::ISwapRouter::multicallCall { data: inner }.abi_encode();
        let t = tx(1, user(), router(), input, 0);
        let r = receipt(&t, true, vec![transfer_log(0), v2_swap_log(1), transfer_log(2), v3_swap_log(3)]);
        let actions = decoder().decode(&t, &r, BLOCK, &universe()).actions().to_vec();

        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].venue, pair());
        assert_eq!(actions[0].protocol, "Uniswap V2");
        assert_eq!(actions[0].action_index, 0);
        assert_eq!(actions[0].log_index, Some(1));
        assert_eq!(actions[1].venue, v3_pool());
        assert_eq!(actions[1].protocol, "Uniswap V3");
        assert_eq!(actions[1].action_index, 1);
        assert!(actions.iter().all(|a| a.action_type == ActionType::Swap));
    }

    #[test]
    fn test_batch_without_events_falls_back_to_function_type() {
        let input = crate::contracts::ISwapRouter::multicallCall { data: vec![] }.abi_encode();
        let t = tx(1, user(), router(), input, 0);
        let r = receipt(&t, true, vec![transfer_log(0)]);
        let actions = decoder().decode(&t, &r, BLOCK, &universe()).actions().to_vec();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::Multicall);
        assert_eq!(actions[0].venue, router());
    }
}
