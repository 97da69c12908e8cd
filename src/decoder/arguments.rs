//! Calldata Argument Decoding
//!
//! Best-effort extraction of the interesting arguments of known router and
//! lending calls into action metadata. A call that does not decode simply
//! contributes no metadata.
//!
//! Author: AI-Generated
//! Created: 2026-10-19
//!
//! Supported calls:
//!     V2 Router:   swapExactTokensForTokens, swapTokensForExactTokens,
//!                  swapExactETHForTokens, swapExactTokensForETH,
//!                  addLiquidity, removeLiquidity
//!     V3 Router:   exactInputSingle
//!     Aave V3:     supply, borrow

use crate::contracts::{IAaveV3Pool, ISwapRouter, IUniswapV2Router02};
use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use std::collections::BTreeMap;
use tracing::trace;

pub type Metadata = BTreeMap<String, String>;

fn put_addr(meta: &mut Metadata, key: &str, addr: Address) {
    meta.insert(key.to_string(), format!("{:#x}", addr));
}

fn put_amount(meta: &mut Metadata, key: &str, amount: U256) {
    meta.insert(key.to_string(), amount.to_string());
}

/// First and last hop of a V2 path
fn put_path(meta: &mut Metadata, path: &[Address]) {
    if let (Some(first), Some(last)) = (path.first(), path.last()) {
        put_addr(meta, "token_in", *first);
        put_addr(meta, "token_out", *last);
        meta.insert("hops".to_string(), path.len().saturating_sub(1).to_string());
    }
}

/// Decode the arguments of `input` (selector included) when its call is known.
pub fn decode_arguments(input: &[u8]) -> Metadata {
    let mut meta = Metadata::new();
    if input.len() < 4 {
        return meta;
    }
    let selector: [u8; 4] = [input[0], input[1], input[2], input[3]];

    let decoded = match selector {
        IUniswapV2Router02::swapExactTokensForTokensCall::SELECTOR => {
            IUniswapV2Router02::swapExactTokensForTokensCall::abi_decode(input)
                .map(|c| {
                    put_path(&mut meta, &c.path);
                    put_amount(&mut meta, "amount_in", c.amountIn);
                })
                .is_ok()
        }
        IUniswapV2Router02::swapTokensForExactTokensCall::SELECTOR => {
            IUniswapV2Router02::swapTokensForExactTokensCall::abi_decode(input)
                .map(|c| {
                    put_path(&mut meta, &c.path);
                    put_amount(&mut meta, "amount_out", c.amountOut);
                })
                .is_ok()
        }
        IUniswapV2Router02::swapExactETHForTokensCall::SELECTOR => {
            IUniswapV2Router02::swapExactETHForTokensCall::abi_decode(input)
                .map(|c| put_path(&mut meta, &c.path))
                .is_ok()
        }
        IUniswapV2Router02::swapExactTokensForETHCall::SELECTOR => {
            IUniswapV2Router02::swapExactTokensForETHCall::abi_decode(input)
                .map(|c| {
                    put_path(&mut meta, &c.path);
                    put_amount(&mut meta, "amount_in", c.amountIn);
                })
                .is_ok()
        }
        IUniswapV2Router02::addLiquidityCall::SELECTOR => {
            IUniswapV2Router02::addLiquidityCall::abi_decode(input)
                .map(|c| {
                    put_addr(&mut meta, "token_a", c.tokenA);
                    put_addr(&mut meta, "token_b", c.tokenB);
                })
                .is_ok()
        }
        IUniswapV2Router02::removeLiquidityCall::SELECTOR => {
            IUniswapV2Router02::removeLiquidityCall::abi_decode(input)
                .map(|c| {
                    put_addr(&mut meta, "token_a", c.tokenA);
                    put_addr(&mut meta, "token_b", c.tokenB);
                    put_amount(&mut meta, "liquidity", c.liquidity);
                })
                .is_ok()
        }
        ISwapRouter::exactInputSingleCall::SELECTOR => {
            ISwapRouter::exactInputSingleCall::abi_decode(input)
                .map(|c| {
                    put_addr(&mut meta, "token_in", c.params.tokenIn);
                    put_addr(&mut meta, "token_out", c.params.tokenOut);
                    meta.insert("fee".to_string(), c.params.fee.to_string());
                    put_amount(&mut meta, "amount_in", c.params.amountIn);
                })
                .is_ok()
        }
        IAaveV3Pool::supplyCall::SELECTOR => IAaveV3Pool::supplyCall::abi_decode(input)
            .map(|c| {
                put_addr(&mut meta, "asset", c.asset);
                put_amount(&mut meta, "amount", c.amount);
            })
            .is_ok(),
        IAaveV3Pool::borrowCall::SELECTOR => IAaveV3Pool::borrowCall::abi_decode(input)
            .map(|c| {
                put_addr(&mut meta, "asset", c.asset);
                put_amount(&mut meta, "amount", c.amount);
            })
            .is_ok(),
        _ => return meta,
    };

    if !decoded {
        trace!(
            "Arguments of 0x{:02x}{:02x}{:02x}{:02x} did not decode",
            selector[0], selector[1], selector[2], selector[3]
        );
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::aliases::{U160, U24};

    fn weth() -> Address {
        Address::repeat_byte(0xee)
    }

    fn usdc() -> Address {
        Address::repeat_byte(0xcc)
    }

    #[test]
    fn test_v2_swap_path() {
        let call = IUniswapV2Router02::swapExactTokensForTokensCall {
            amountIn: U256::from(1_000u64),
            amountOutMin: U256::from(990u64),
            path: vec![weth(), Address::repeat_byte(0x01), usdc()],
            to: Address::repeat_byte(0x02),
            deadline: U256::from(1u64),
        };
        let meta = decode_arguments(&call.abi_encode());
        assert_eq!(meta["token_in"], format!("{:#x}", weth()));
        assert_eq!(meta["token_out"], format!("{:#x}", usdc()));
        assert_eq!(meta["hops"], "2");
        assert_eq!(meta["amount_in"], "1000");
    }

    #[test]
    fn test_v3_exact_input_single() {
        let call = ISwapRouter::exactInputSingleCall {
            params: ISwapRouter::ExactInputSingleParams {
                tokenIn: usdc(),
                tokenOut: weth(),
                fee: U24::from(500u32),
                recipient: Address::repeat_byte(0x02),
                deadline: U256::from(1u64),
                amountIn: U256::from(5u64),
                amountOutMinimum: U256::ZERO,
                sqrtPriceLimitX96: U160::ZERO,
            },
        };
        let meta = decode_arguments(&call.abi_encode());
        assert_eq!(meta["token_in"], format!("{:#x}", usdc()));
        assert_eq!(meta["fee"], "500");
    }

    #[test]
    fn test_truncated_or_unknown_calldata_gives_nothing() {
        let call = IAaveV3Pool::supplyCall {
            asset: usdc(),
            amount: U256::from(7u64),
            onBehalfOf: Address::repeat_byte(0x02),
            referralCode: 0,
        };
        let encoded = call.abi_encode();
        assert_eq!(decode_arguments(&encoded)["asset"], format!("{:#x}", usdc()));
        assert!(decode_arguments(&encoded[..40]).is_empty());
        assert!(decode_arguments(&[0xde, 0xad, 0xbe, 0xef, 0x00]).is_empty());
        assert!(decode_arguments(&[0x38]).is_empty());
    }
}
