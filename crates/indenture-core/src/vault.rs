//! Stablecoin collateral vault: backing pool, yield pool, release accounting,
//! and the backing-status state machine.
//!
//! The vault is strictly pull-based on prices. Ratio computation is a pure
//! function of `(collateral, locked tokens, price)`; callers decide when to
//! refresh and which validated price to use. Status is the only field a
//! refresh may change.

use tracing::{debug, warn};

use crate::math::{add_u64, floor_bps, sub_u64};
use crate::types::{AccountId, Bps, Price, Stable, Tokens, BPS_U64, PRICE_SCALE};
use crate::{IndentureError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollateralStatus {
    /// Ratio at or above the required threshold; releases permitted.
    Sufficient,
    /// Ratio below required; creator releases and withdrawals blocked until
    /// the backing is replenished.
    MarginCall,
    /// Ratio below half the required threshold. Reports and blocks like a
    /// margin call; automatic liquidation mechanics are out of scope.
    Liquidating,
}

/// Sentinel ratio when no tokens are locked: nothing to back means the
/// position is trivially sufficient.
pub const RATIO_UNBACKED_BPS: u64 = u64::MAX;

/// Pure ratio computation: collateral value over the price-converted value of
/// the locked tokens it backs, in bps.
pub fn compute_ratio(collateral: Stable, locked: Tokens, price: Price) -> Result<u64> {
    let locked_value = (locked.get() as u128)
        .checked_mul(price.get() as u128)
        .ok_or_else(|| IndentureError::BoundedValueExceeded("locked value overflow".into()))?
        / (PRICE_SCALE as u128);
    if locked_value == 0 {
        return Ok(RATIO_UNBACKED_BPS);
    }
    let num = (collateral.get() as u128)
        .checked_mul(BPS_U64 as u128)
        .ok_or_else(|| IndentureError::BoundedValueExceeded("ratio overflow".into()))?;
    Ok(u64::try_from(num / locked_value).unwrap_or(RATIO_UNBACKED_BPS))
}

/// Status implied by a ratio against the required threshold.
pub fn status_for(ratio_bps: u64, required: Bps) -> CollateralStatus {
    let required = required.as_u64();
    if ratio_bps >= required {
        CollateralStatus::Sufficient
    } else if ratio_bps < required / 2 {
        CollateralStatus::Liquidating
    } else {
        CollateralStatus::MarginCall
    }
}

/// The creator's collateral position and both stablecoin pools.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollateralVault {
    depositor: AccountId,
    /// Backing pool; pays redemptions, covers the required ratio.
    collateral: u64,
    /// Payout pool; funds distribution rounds.
    yield_reserve: u64,
    /// Cumulative principal-equivalent released to the creator.
    released: u64,
    /// Cumulative net stablecoin inflow (deposits minus withdrawals), the
    /// right-hand side of the stable conservation invariant.
    deposited_total: u64,
    /// Threshold values in effect at the last refresh, recorded for
    /// reporting; checks always read live params.
    required_ratio: Bps,
    unlocked_fraction: Bps,
    last_ratio_bps: u64,
    status: CollateralStatus,
}

impl CollateralVault {
    pub fn new(depositor: AccountId, required_ratio: Bps, unlocked_fraction: Bps) -> Self {
        CollateralVault {
            depositor,
            collateral: 0,
            yield_reserve: 0,
            released: 0,
            deposited_total: 0,
            required_ratio,
            unlocked_fraction,
            last_ratio_bps: RATIO_UNBACKED_BPS,
            status: CollateralStatus::Sufficient,
        }
    }

    pub fn depositor(&self) -> AccountId {
        self.depositor
    }

    pub fn collateral(&self) -> Stable {
        Stable::new(self.collateral)
    }

    pub fn yield_reserve(&self) -> Stable {
        Stable::new(self.yield_reserve)
    }

    pub fn released(&self) -> Tokens {
        Tokens::new(self.released)
    }

    pub fn deposited_total(&self) -> Stable {
        Stable::new(self.deposited_total)
    }

    pub fn status(&self) -> CollateralStatus {
        self.status
    }

    pub fn last_ratio_bps(&self) -> u64 {
        self.last_ratio_bps
    }

    /// Required ratio in effect at the last refresh (reporting only).
    pub fn required_ratio(&self) -> Bps {
        self.required_ratio
    }

    /// Unlocked fraction in effect at the last refresh (reporting only).
    pub fn unlocked_fraction(&self) -> Bps {
        self.unlocked_fraction
    }

    /// Tops up the backing pool. Any account may deposit; the position's
    /// depositor stays the manager.
    pub fn deposit(&mut self, amount: Stable) -> Result<()> {
        if amount.is_zero() {
            return Err(IndentureError::InvalidInput(
                "deposit amount must be > 0".into(),
            ));
        }
        let new_collateral = add_u64(self.collateral, amount.get())?;
        let new_total = add_u64(self.deposited_total, amount.get())?;
        self.collateral = new_collateral;
        self.deposited_total = new_total;
        Ok(())
    }

    /// Tops up the yield pool that funds distribution rounds.
    pub fn deposit_yield(&mut self, amount: Stable) -> Result<()> {
        if amount.is_zero() {
            return Err(IndentureError::InvalidInput(
                "yield deposit amount must be > 0".into(),
            ));
        }
        let new_reserve = add_u64(self.yield_reserve, amount.get())?;
        let new_total = add_u64(self.deposited_total, amount.get())?;
        self.yield_reserve = new_reserve;
        self.deposited_total = new_total;
        Ok(())
    }

    /// Recomputes the backing ratio at `price` and transitions status.
    ///
    /// Idempotent and side-effect-free except for the status/reporting
    /// fields.
    pub fn refresh_status(
        &mut self,
        locked: Tokens,
        price: Price,
        required_ratio: Bps,
        unlocked_fraction: Bps,
    ) -> Result<CollateralStatus> {
        let ratio = compute_ratio(Stable::new(self.collateral), locked, price)?;
        let next = status_for(ratio, required_ratio);
        if self.status == CollateralStatus::Sufficient && next != CollateralStatus::Sufficient {
            warn!(
                ratio_bps = ratio,
                required_bps = required_ratio.as_u64(),
                ?next,
                "collateral backing fell below the required ratio"
            );
        } else if next != self.status {
            debug!(ratio_bps = ratio, ?next, "collateral status changed");
        }
        self.last_ratio_bps = ratio;
        self.required_ratio = required_ratio;
        self.unlocked_fraction = unlocked_fraction;
        self.status = next;
        Ok(next)
    }

    /// Recomputes the backing status valuing locked tokens at par, for the
    /// paths that change the ratio without a market quote in hand (bond
    /// issuance, collateral deposits). The next `refresh_status` re-prices.
    pub fn refresh_at_par(
        &mut self,
        locked: Tokens,
        required_ratio: Bps,
        unlocked_fraction: Bps,
    ) -> CollateralStatus {
        // At par the price factor cancels: ratio = collateral / locked.
        let ratio = if locked.is_zero() {
            RATIO_UNBACKED_BPS
        } else {
            let num = (self.collateral as u128) * (BPS_U64 as u128);
            u64::try_from(num / (locked.get() as u128)).unwrap_or(RATIO_UNBACKED_BPS)
        };
        let next = status_for(ratio, required_ratio);
        if self.status == CollateralStatus::Sufficient && next != CollateralStatus::Sufficient {
            warn!(
                ratio_bps = ratio,
                required_bps = required_ratio.as_u64(),
                ?next,
                "par-value backing fell below the required ratio"
            );
        } else if next != self.status {
            debug!(ratio_bps = ratio, ?next, "collateral status changed");
        }
        self.last_ratio_bps = ratio;
        self.required_ratio = required_ratio;
        self.unlocked_fraction = unlocked_fraction;
        self.status = next;
        next
    }

    /// Re-applies a changed required ratio to the last observed backing
    /// ratio (governed ratio adjustments). The next `refresh_status`
    /// re-prices; until then the status reflects the new threshold at the
    /// old observation.
    pub fn apply_required_ratio(
        &mut self,
        required_ratio: Bps,
        unlocked_fraction: Bps,
    ) -> CollateralStatus {
        let next = status_for(self.last_ratio_bps, required_ratio);
        if self.status == CollateralStatus::Sufficient && next != CollateralStatus::Sufficient {
            warn!(
                ratio_bps = self.last_ratio_bps,
                required_bps = required_ratio.as_u64(),
                ?next,
                "ratio adjustment pushed backing below the required ratio"
            );
        }
        self.required_ratio = required_ratio;
        self.unlocked_fraction = unlocked_fraction;
        self.status = next;
        next
    }

    fn ensure_sufficient(&self, required: Bps) -> Result<()> {
        if self.status != CollateralStatus::Sufficient {
            return Err(IndentureError::MarginCallActive {
                ratio_bps: self.last_ratio_bps,
                required_bps: required.as_u64(),
            });
        }
        Ok(())
    }

    /// Releases raised principal to the creator, up to the governed fraction.
    ///
    /// The release is incremental against `released`: requesting a fraction
    /// already fully released returns zero rather than paying twice. The
    /// released value leaves the system boundary; the ledger's locked
    /// columns are untouched.
    pub fn unlock_funds(
        &mut self,
        total_raised: Tokens,
        requested: Bps,
        unlocked_fraction: Bps,
        required_ratio: Bps,
    ) -> Result<Tokens> {
        self.ensure_sufficient(required_ratio)?;
        if requested > unlocked_fraction {
            return Err(IndentureError::ThresholdExceeded {
                requested_bps: requested.get(),
                limit_bps: unlocked_fraction.get(),
            });
        }
        let allowed = floor_bps(total_raised.get(), requested)?;
        let incremental = allowed.saturating_sub(self.released);
        self.released = add_u64(self.released, incremental)?;
        Ok(Tokens::new(incremental))
    }

    /// Withdraws backing collateral out of the system boundary.
    ///
    /// Rejected unless the remainder still covers the required ratio over
    /// the outstanding principal at par, so the creator cannot drain the
    /// pool bonds redeem against.
    pub fn withdraw_collateral(
        &mut self,
        outstanding: Tokens,
        amount: Stable,
        required_ratio: Bps,
    ) -> Result<()> {
        if amount.is_zero() {
            return Err(IndentureError::InvalidInput(
                "withdrawal amount must be > 0".into(),
            ));
        }
        self.ensure_sufficient(required_ratio)?;
        let floor = floor_bps(outstanding.get(), required_ratio)?;
        let available = self.collateral.saturating_sub(floor);
        if amount.get() > available {
            return Err(IndentureError::InsufficientReserve {
                requested: amount.get(),
                available,
            });
        }
        let new_collateral = sub_u64(self.collateral, amount.get())?;
        let new_total = sub_u64(self.deposited_total, amount.get())?;
        self.collateral = new_collateral;
        self.deposited_total = new_total;
        Ok(())
    }

    /// Debits the backing pool for a bond redemption payment.
    pub fn pay_redemption(&mut self, amount: Stable) -> Result<()> {
        if self.collateral < amount.get() {
            return Err(IndentureError::InsufficientReserve {
                requested: amount.get(),
                available: self.collateral,
            });
        }
        self.collateral = sub_u64(self.collateral, amount.get())?;
        Ok(())
    }

    /// Debits the yield pool for a distribution round payout.
    pub fn pay_yield(&mut self, amount: Stable) -> Result<()> {
        if self.yield_reserve < amount.get() {
            return Err(IndentureError::InsufficientReserve {
                requested: amount.get(),
                available: self.yield_reserve,
            });
        }
        self.yield_reserve = sub_u64(self.yield_reserve, amount.get())?;
        Ok(())
    }

    /// Moves stablecoin from the backing pool to the yield pool.
    pub fn reallocate_collateral_to_yield(&mut self, amount: Stable) -> Result<()> {
        if self.collateral < amount.get() {
            return Err(IndentureError::InsufficientReserve {
                requested: amount.get(),
                available: self.collateral,
            });
        }
        let new_collateral = sub_u64(self.collateral, amount.get())?;
        let new_reserve = add_u64(self.yield_reserve, amount.get())?;
        self.collateral = new_collateral;
        self.yield_reserve = new_reserve;
        Ok(())
    }

    /// Moves stablecoin from the yield pool to the backing pool.
    pub fn reallocate_yield_to_collateral(&mut self, amount: Stable) -> Result<()> {
        if self.yield_reserve < amount.get() {
            return Err(IndentureError::InsufficientReserve {
                requested: amount.get(),
                available: self.yield_reserve,
            });
        }
        let new_reserve = sub_u64(self.yield_reserve, amount.get())?;
        let new_collateral = add_u64(self.collateral, amount.get())?;
        self.yield_reserve = new_reserve;
        self.collateral = new_collateral;
        Ok(())
    }

    /// Restores a vault verbatim (snapshot load path).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        depositor: AccountId,
        collateral: u64,
        yield_reserve: u64,
        released: u64,
        deposited_total: u64,
        required_ratio: Bps,
        unlocked_fraction: Bps,
        last_ratio_bps: u64,
        status: CollateralStatus,
    ) -> Self {
        CollateralVault {
            depositor,
            collateral,
            yield_reserve,
            released,
            deposited_total,
            required_ratio,
            unlocked_fraction,
            last_ratio_bps,
            status,
        }
    }
}
