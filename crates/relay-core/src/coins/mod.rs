//! Coin provisioning.
//!
//! Value on the ledger lives in indivisible coin objects, so funding a
//! payload means choosing whole coins. The provisioner picks payload coins
//! greedily from the largest down and makes sure enough value stays outside
//! the selection to pay gas. When it does not, it splits a dedicated gas
//! coin off the largest coin in a separate transaction and selects again,
//! never putting the dedicated coin back into the payload.

use relay_config::CoinsConfig;
use relay_delivery::{DeliveryError, DeliveryService};
use relay_types::{format_coin_amount, truncate_id, CallSpec, CoinRecord, GasPlan, ObjectId};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Decimals of the native gas coin, used for log output.
const GAS_COIN_DECIMALS: u8 = 9;

/// Errors that can occur while provisioning coins.
#[derive(Debug, Error)]
pub enum ProvisionError {
	#[error("No coins of type {coin_type} owned")]
	NoCoins { coin_type: String },
	#[error("Insufficient {coin_type} balance: have {available}, need {required}")]
	InsufficientBalance {
		coin_type: String,
		available: u128,
		required: u128,
	},
	#[error("Gas coin split failed: {0}")]
	SplitFailed(String),
	#[error("No coin can be built up to hold the gas reserve: need {needed}, can reach {available}")]
	ReserveUnavailable { needed: u128, available: u128 },
	#[error("Coin selection did not converge after {passes} passes")]
	RetryExhausted { passes: u32 },
	#[error("Delivery error: {0}")]
	Delivery(#[from] DeliveryError),
}

/// Payload coins chosen from a sorted coin list.
#[derive(Debug, PartialEq, Eq)]
struct Selection {
	ids: Vec<ObjectId>,
	sum: u128,
}

/// Sorts by balance, largest first; equal balances by object id.
fn sort_coins(coins: &mut [CoinRecord]) {
	coins.sort_by(|a, b| b.balance.cmp(&a.balance).then_with(|| a.id.cmp(&b.id)));
}

/// Takes coins in order, skipping `exclude`, until their sum reaches
/// `payload`. Returns everything eligible when the sum never gets there.
fn select_prefix(coins: &[CoinRecord], exclude: Option<&ObjectId>, payload: u64) -> Selection {
	let mut selection = Selection {
		ids: Vec::new(),
		sum: 0,
	};
	let target = payload as u128;

	for coin in coins.iter().filter(|c| Some(&c.id) != exclude) {
		if selection.sum >= target {
			break;
		}
		selection.ids.push(coin.id.clone());
		selection.sum += coin.balance as u128;
	}
	selection
}

fn total_of(coins: &[CoinRecord]) -> u128 {
	coins.iter().map(|c| c.balance as u128).sum()
}

/// Selects coins for payloads and keeps a gas reserve available.
pub struct CoinProvisioner {
	delivery: Arc<DeliveryService>,
	config: CoinsConfig,
	gas_coin_type: String,
}

impl CoinProvisioner {
	pub fn new(delivery: Arc<DeliveryService>, config: CoinsConfig, gas_coin_type: String) -> Self {
		Self {
			delivery,
			config,
			gas_coin_type,
		}
	}

	/// Coins of the gas type pay for their own split and merge calls.
	fn is_gas_type(&self, coin_type: &str) -> bool {
		coin_type == self.gas_coin_type
	}

	/// Gas budget scaled by the safety buffer, rounded up.
	pub fn buffered_gas(&self, gas_budget: u64) -> u64 {
		let scaled = (gas_budget as u128 * self.config.gas_buffer_percent as u128).div_ceil(100);
		scaled.min(u64::MAX as u128) as u64
	}

	/// Chooses coins of `coin_type` worth at least `payload`, leaving at
	/// least the buffered `gas_budget` outside the selection.
	///
	/// Fails without touching the ledger when the total balance cannot
	/// cover both. Otherwise it may issue one split transaction per extra
	/// pass, up to the configured pass limit.
	#[instrument(skip_all, fields(coin_type = %coin_type, payload, gas_budget))]
	pub async fn provision(
		&self,
		coin_type: &str,
		payload: u64,
		gas_budget: u64,
	) -> Result<GasPlan, ProvisionError> {
		let reserve = self.buffered_gas(gas_budget);
		let required = payload as u128 + reserve as u128;
		let mut dedicated: Option<ObjectId> = None;

		for pass in 1..=self.config.max_passes {
			let mut coins = self.delivery.get_owned_coins(coin_type).await?;
			if coins.is_empty() {
				return Err(ProvisionError::NoCoins {
					coin_type: coin_type.to_string(),
				});
			}

			let total = total_of(&coins);
			if total < required {
				return Err(ProvisionError::InsufficientBalance {
					coin_type: coin_type.to_string(),
					available: total,
					required,
				});
			}

			sort_coins(&mut coins);
			// A dedicated coin that has not shown up yet cannot be excluded.
			let exclude = dedicated
				.as_ref()
				.filter(|id| coins.iter().any(|c| &c.id == *id));
			let selection = select_prefix(&coins, exclude, payload);
			let remaining = total - selection.sum;

			if selection.sum >= payload as u128 && remaining >= reserve as u128 {
				tracing::debug!(
					pass,
					coins = selection.ids.len(),
					selected = %selection.sum,
					remaining = %remaining,
					"Coins selected"
				);
				return Ok(GasPlan {
					swap_coin_ids: selection.ids,
					dedicated_gas_coin_id: exclude.cloned(),
				});
			}

			if pass == self.config.max_passes {
				break;
			}

			let source = self.split_source(coin_type, &coins, exclude, reserve).await?;
			tracing::info!(
				pass,
				coin = %truncate_id(source.as_str()),
				amount = reserve,
				remaining = %remaining,
				"Remaining balance below gas reserve, splitting dedicated gas coin"
			);
			dedicated = Some(self.split_gas_coin(coin_type, &source, reserve).await?);
		}

		Err(ProvisionError::RetryExhausted {
			passes: self.config.max_passes,
		})
	}

	/// Picks the coin to split the reserve off: the largest eligible coin,
	/// with the next largest merged into it until it holds enough.
	async fn split_source(
		&self,
		coin_type: &str,
		sorted: &[CoinRecord],
		exclude: Option<&ObjectId>,
		reserve: u64,
	) -> Result<ObjectId, ProvisionError> {
		let fee = if self.is_gas_type(coin_type) {
			self.config.split_gas_budget as u128
		} else {
			0
		};
		// The split pays one fee from the source, a merge another.
		let needed = |merging: bool| reserve as u128 + fee * (1 + merging as u128);

		let mut eligible = sorted.iter().filter(|c| Some(&c.id) != exclude);
		let largest = eligible
			.next()
			.ok_or_else(|| ProvisionError::SplitFailed("no coin to split".into()))?;
		let mut merged = vec![largest.id.clone()];
		let mut balance = largest.balance as u128;

		for coin in eligible {
			if balance >= needed(merged.len() > 1) {
				break;
			}
			merged.push(coin.id.clone());
			balance += coin.balance as u128;
		}

		let needed = needed(merged.len() > 1);
		if balance < needed {
			return Err(ProvisionError::ReserveUnavailable {
				needed,
				available: balance,
			});
		}

		if merged.len() > 1 {
			tracing::info!(
				coin = %truncate_id(largest.id.as_str()),
				merged = merged.len() - 1,
				"Largest coin below gas reserve, merging coins into it"
			);
			self.merge_coins(coin_type, &merged).await?;
		}
		Ok(largest.id.clone())
	}

	/// Splits `amount` off `source` and returns the id of the new coin.
	async fn split_gas_coin(
		&self,
		coin_type: &str,
		source: &ObjectId,
		amount: u64,
	) -> Result<ObjectId, ProvisionError> {
		let call = if self.is_gas_type(coin_type) {
			CallSpec::SplitGasCoin {
				coin: source.clone(),
				amounts: vec![amount],
			}
		} else {
			CallSpec::SplitCoin {
				coin: source.clone(),
				amounts: vec![amount],
			}
		};
		let result = self
			.delivery
			.submit_and_wait(&call, &GasPlan::gas_only(), self.config.split_gas_budget)
			.await
			.map_err(|e| ProvisionError::SplitFailed(e.to_string()))?;

		if !result.success {
			return Err(ProvisionError::SplitFailed(format!(
				"transaction {} aborted: {}",
				result.digest,
				result.failure_reason().unwrap_or_default()
			)));
		}

		result
			.find_created(|kind| kind.is_coin_of(coin_type))
			.map(|created| created.object_id.clone())
			.ok_or_else(|| {
				ProvisionError::SplitFailed(format!(
					"transaction {} created no {} coin",
					result.digest, coin_type
				))
			})
	}

	/// Sum of all owned coins of `coin_type`.
	pub async fn total_balance(&self, coin_type: &str) -> Result<u128, ProvisionError> {
		let coins = self.delivery.get_owned_coins(coin_type).await?;
		Ok(total_of(&coins))
	}

	/// The owned coin of `coin_type` with the largest balance.
	pub async fn largest_coin(&self, coin_type: &str) -> Result<Option<CoinRecord>, ProvisionError> {
		let mut coins = self.delivery.get_owned_coins(coin_type).await?;
		sort_coins(&mut coins);
		Ok(coins.into_iter().next())
	}

	/// Merges `coin_ids` of `coin_type` into the first of them. Returns the
	/// surviving coin, or `None` for an empty list.
	///
	/// Gas-type coins are folded in one transaction paid from the merged
	/// coin; other coins take one transaction per merged coin.
	pub async fn merge_coins(
		&self,
		coin_type: &str,
		coin_ids: &[ObjectId],
	) -> Result<Option<ObjectId>, ProvisionError> {
		let Some((primary, rest)) = coin_ids.split_first() else {
			return Ok(None);
		};
		if rest.is_empty() {
			return Ok(Some(primary.clone()));
		}

		if self.is_gas_type(coin_type) {
			let call = CallSpec::MergeGasCoins {
				coins: coin_ids.to_vec(),
			};
			let result = self
				.delivery
				.submit_and_wait(&call, &GasPlan::gas_only(), self.config.split_gas_budget)
				.await?;
			relay_delivery::ensure_success(result)?;
			return Ok(Some(primary.clone()));
		}

		for coin in rest {
			let call = CallSpec::MergeCoins {
				primary: primary.clone(),
				coin_to_merge: coin.clone(),
			};
			let result = self
				.delivery
				.submit_and_wait(&call, &GasPlan::gas_only(), self.config.split_gas_budget)
				.await?;
			relay_delivery::ensure_success(result)?;
		}

		Ok(Some(primary.clone()))
	}

	/// Verifies that at least one coin of each `(coin_type, label)` is
	/// owned, logging the balances.
	pub async fn check_required(&self, required: &[(&str, &str)]) -> Result<(), ProvisionError> {
		for (coin_type, label) in required {
			let coins = self.delivery.get_owned_coins(coin_type).await?;
			if coins.is_empty() {
				tracing::error!(coin_type = %coin_type, "No {} coins owned", label);
				return Err(ProvisionError::NoCoins {
					coin_type: coin_type.to_string(),
				});
			}

			let total = total_of(&coins);
			let balance = u64::try_from(total)
				.map(|t| format_coin_amount(t, GAS_COIN_DECIMALS))
				.unwrap_or_else(|_| total.to_string());
			tracing::info!(
				coin_type = %coin_type,
				coins = coins.len(),
				balance = %balance,
				"Found {} coins",
				label
			);
		}
		Ok(())
	}
}
