use crate::{hash, Hash32, IndentureError, Result};

pub const BPS_U16: u16 = 10_000;
pub const BPS_U64: u64 = 10_000;

/// Cap on governed annual rates (bond interest, distribution yield): 10%.
pub const RATE_CAP_BPS: u16 = 1_000;

/// Fixed-point scale for price quotes: `PRICE_SCALE` = 1.0 = minor-unit par.
pub const PRICE_SCALE: u64 = 1_000_000;

/// Basis points in `[0, 10_000]` (correct-by-construction).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bps(u16);

impl Bps {
    pub const ZERO: Bps = Bps(0);
    pub const MAX: Bps = Bps(BPS_U16);

    /// Constructs a bounded bps value.
    ///
    /// Preconditions:
    /// - `v <= 10_000` (else returns an error; fail-closed).
    ///
    /// Postconditions:
    /// - `self.get()` is always in `[0, 10_000]` and can be used without re-checking.
    pub fn new(v: u16) -> Result<Bps> {
        if v <= BPS_U16 {
            Ok(Bps(v))
        } else {
            Err(IndentureError::InvalidInput(format!(
                "bps out of range: {v} > {BPS_U16}"
            )))
        }
    }

    pub fn get(self) -> u16 {
        self.0
    }

    pub fn as_u64(self) -> u64 {
        self.0 as u64
    }

    /// The complement `10_000 - self`, e.g. the creator-releasable fraction
    /// implied by a collateral ratio.
    pub fn complement(self) -> Bps {
        Bps(BPS_U16 - self.0)
    }
}

impl TryFrom<u16> for Bps {
    type Error = IndentureError;
    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        Bps::new(value)
    }
}

/// Bond-token amount in minor units (6 decimals).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tokens(u64);

impl Tokens {
    pub const ZERO: Tokens = Tokens(0);

    pub fn new(v: u64) -> Tokens {
        Tokens(v)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// Stablecoin amount in minor units (6 decimals).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stable(u64);

impl Stable {
    pub const ZERO: Stable = Stable(0);

    pub fn new(v: u64) -> Stable {
        Stable(v)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// Token price: stablecoin minor units per token minor unit, scaled by
/// [`PRICE_SCALE`]. `Price::PAR` is the 1:1 issuance convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(u64);

impl Price {
    pub const PAR: Price = Price(PRICE_SCALE);

    /// Constructs a price. Zero is rejected: a zero quote carries no
    /// information and would turn ratio math into division noise.
    pub fn new(scaled: u64) -> Result<Price> {
        if scaled == 0 {
            return Err(IndentureError::InvalidInput(
                "price must be positive".into(),
            ));
        }
        Ok(Price(scaled))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Unix timestamp in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn get(self) -> i64 {
        self.0
    }

    pub fn plus_secs(self, secs: u64) -> Timestamp {
        Timestamp(self.0.saturating_add(secs.min(i64::MAX as u64) as i64))
    }

    /// Seconds elapsed since `earlier` (negative if `earlier` is in the future).
    pub fn since(self, earlier: Timestamp) -> i64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Opaque 32-byte account identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(pub Hash32);

impl AccountId {
    /// Hex form, for logs and config files.
    pub fn to_hex(self) -> String {
        hex::encode(self.0 .0)
    }

    pub fn from_hex(s: &str) -> Result<AccountId> {
        let bytes = hex::decode(s)
            .map_err(|e| IndentureError::InvalidInput(format!("account id is not hex: {e}")))?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            IndentureError::InvalidInput("account id must be 32 bytes (64 hex chars)".into())
        })?;
        Ok(AccountId(Hash32(arr)))
    }
}

/// Governance proposal handle (monotone counter).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProposalId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BondId(pub Hash32);

impl BondId {
    pub const DOMAIN_V1: &'static [u8] = b"INDENTURE_BOND_ID_V1";

    /// Deterministically derives a bond identifier.
    ///
    /// Rationale: bond IDs are content-addressed (domain-separated hash) so
    /// callers don't have to coordinate a global counter; uniqueness comes
    /// from `(owner, issued_at, nonce)`.
    pub fn derive(owner: AccountId, issued_at: Timestamp, nonce: Hash32) -> BondId {
        let mut bytes = Vec::with_capacity(Self::DOMAIN_V1.len() + 32 + 8 + 32);
        bytes.extend_from_slice(Self::DOMAIN_V1);
        bytes.extend_from_slice(&owner.0 .0);
        bytes.extend_from_slice(&issued_at.get().to_le_bytes());
        bytes.extend_from_slice(&nonce.0);
        BondId(hash::sha256(&bytes))
    }
}

/// Ledger policy parameters (validated once at construction).
///
/// Four of these are GOVERNED: executed proposals mutate them through the
/// validating setters below, so the bundle stays well-formed for its whole
/// life. The rest are POLICY-SET at genesis and never change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Params {
    collateral_ratio: Bps,
    unlocked_fraction: Bps,

    interest_rate: Bps,
    distribution_rate: Bps,
    distribution_period_secs: u64,

    early_withdrawal_penalty: Bps,
    min_investment: Tokens,

    quorum: Bps,
    voting_period_secs: u64,
    execution_delay_secs: u64,
    execution_window_secs: u64,
    proposal_threshold: Tokens,
}

impl Params {
    /// Creates a new parameter bundle.
    ///
    /// Preconditions (enforced):
    /// - `collateral_ratio > 0` (a zero ratio means nothing backs the bonds).
    /// - `interest_rate <= 1_000` and `distribution_rate <= 1_000` (rate cap).
    /// - `quorum > 0` (a zero quorum lets an empty vote pass).
    /// - `distribution_period_secs`, `voting_period_secs`,
    ///   `execution_window_secs` all `> 0`.
    ///
    /// Postconditions:
    /// - `unlocked_fraction == 10_000 - collateral_ratio`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        collateral_ratio: Bps,
        interest_rate: Bps,
        distribution_rate: Bps,
        distribution_period_secs: u64,
        early_withdrawal_penalty: Bps,
        min_investment: Tokens,
        quorum: Bps,
        voting_period_secs: u64,
        execution_delay_secs: u64,
        execution_window_secs: u64,
        proposal_threshold: Tokens,
    ) -> Result<Params> {
        if collateral_ratio == Bps::ZERO {
            return Err(IndentureError::InvalidInput(
                "collateral_ratio must be > 0".into(),
            ));
        }
        Self::check_rate_cap("interest_rate", interest_rate)?;
        Self::check_rate_cap("distribution_rate", distribution_rate)?;
        if quorum == Bps::ZERO {
            return Err(IndentureError::InvalidInput("quorum must be > 0".into()));
        }
        if distribution_period_secs == 0 {
            return Err(IndentureError::InvalidInput(
                "distribution_period_secs must be > 0".into(),
            ));
        }
        if voting_period_secs == 0 {
            return Err(IndentureError::InvalidInput(
                "voting_period_secs must be > 0".into(),
            ));
        }
        if execution_window_secs == 0 {
            return Err(IndentureError::InvalidInput(
                "execution_window_secs must be > 0".into(),
            ));
        }
        Ok(Params {
            collateral_ratio,
            unlocked_fraction: collateral_ratio.complement(),
            interest_rate,
            distribution_rate,
            distribution_period_secs,
            early_withdrawal_penalty,
            min_investment,
            quorum,
            voting_period_secs,
            execution_delay_secs,
            execution_window_secs,
            proposal_threshold,
        })
    }

    fn check_rate_cap(name: &str, rate: Bps) -> Result<()> {
        if rate.get() > RATE_CAP_BPS {
            return Err(IndentureError::BoundedValueExceeded(format!(
                "{name} {}bps exceeds cap {RATE_CAP_BPS}bps",
                rate.get()
            )));
        }
        Ok(())
    }

    /// GOVERNED (ratio adjustment): minimum stablecoin collateral per unit of
    /// bonded token value, in bps.
    pub fn collateral_ratio(&self) -> Bps {
        self.collateral_ratio
    }

    /// Derived from `collateral_ratio`: the fraction of raised principal the
    /// creator may release while backing stays sufficient.
    pub fn unlocked_fraction(&self) -> Bps {
        self.unlocked_fraction
    }

    /// GOVERNED (rate change): annual bond coupon, fixed into each bond's
    /// redemption amount at issuance.
    pub fn interest_rate(&self) -> Bps {
        self.interest_rate
    }

    /// GOVERNED (rate change): annual yield on vault collateral paid out by
    /// distribution rounds, prorated to the period length.
    pub fn distribution_rate(&self) -> Bps {
        self.distribution_rate
    }

    /// POLICY-SET (genesis): length of one distribution period in seconds.
    pub fn distribution_period_secs(&self) -> u64 {
        self.distribution_period_secs
    }

    /// POLICY-SET (genesis): principal fraction forfeited on early withdrawal.
    pub fn early_withdrawal_penalty(&self) -> Bps {
        self.early_withdrawal_penalty
    }

    /// POLICY-SET (genesis): smallest bond principal accepted.
    ///
    /// Rationale: keeps dust bonds from bloating rounds where every active
    /// bond gets a share slot.
    pub fn min_investment(&self) -> Tokens {
        self.min_investment
    }

    /// POLICY-SET (genesis): quorum for simple-majority proposal kinds, as
    /// bps of total locked supply frozen at voting start.
    pub fn quorum(&self) -> Bps {
        self.quorum
    }

    /// POLICY-SET (genesis): length of the voting window in seconds.
    pub fn voting_period_secs(&self) -> u64 {
        self.voting_period_secs
    }

    /// POLICY-SET (genesis): delay between a successful tally and the
    /// earliest execution time.
    ///
    /// Rationale: gives participants time to react to a decided change
    /// before it takes effect.
    pub fn execution_delay_secs(&self) -> u64 {
        self.execution_delay_secs
    }

    /// POLICY-SET (genesis): how long after `eta` a queued proposal remains
    /// executable before it expires.
    pub fn execution_window_secs(&self) -> u64 {
        self.execution_window_secs
    }

    /// POLICY-SET (genesis): minimum locked balance a proposer needs to open
    /// voting on their proposal.
    pub fn proposal_threshold(&self) -> Tokens {
        self.proposal_threshold
    }

    /// Mutator for executed rate-change proposals; re-applies the rate cap.
    pub fn set_interest_rate(&mut self, rate: Bps) -> Result<()> {
        Self::check_rate_cap("interest_rate", rate)?;
        self.interest_rate = rate;
        Ok(())
    }

    /// Mutator for executed rate-change proposals; re-applies the rate cap.
    pub fn set_distribution_rate(&mut self, rate: Bps) -> Result<()> {
        Self::check_rate_cap("distribution_rate", rate)?;
        self.distribution_rate = rate;
        Ok(())
    }

    /// Mutator for executed ratio adjustments; rederives `unlocked_fraction`.
    pub fn set_collateral_ratio(&mut self, ratio: Bps) -> Result<()> {
        if ratio == Bps::ZERO {
            return Err(IndentureError::InvalidInput(
                "collateral_ratio must be > 0".into(),
            ));
        }
        self.collateral_ratio = ratio;
        self.unlocked_fraction = ratio.complement();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Params {
        Params::new(
            Bps::new(3_000).unwrap(),
            Bps::new(1_000).unwrap(),
            Bps::new(500).unwrap(),
            86_400,
            Bps::new(500).unwrap(),
            Tokens::new(1_000),
            Bps::new(5_100).unwrap(),
            86_400,
            43_200,
            1_209_600,
            Tokens::new(10_000),
        )
        .unwrap()
    }

    #[test]
    fn bps_rejects_out_of_range() {
        assert!(Bps::new(10_000).is_ok());
        assert!(Bps::new(10_001).is_err());
    }

    #[test]
    fn bps_complement_inverts() {
        let r = Bps::new(3_000).unwrap();
        assert_eq!(r.complement().get(), 7_000);
        assert_eq!(Bps::MAX.complement(), Bps::ZERO);
    }

    #[test]
    fn price_rejects_zero() {
        assert!(Price::new(0).is_err());
        assert_eq!(Price::PAR.get(), PRICE_SCALE);
    }

    #[test]
    fn params_derive_unlocked_fraction() {
        let p = params();
        assert_eq!(p.unlocked_fraction().get(), 7_000);
    }

    #[test]
    fn params_reject_zero_ratio_and_quorum() {
        let bad = Params::new(
            Bps::ZERO,
            Bps::new(1_000).unwrap(),
            Bps::new(500).unwrap(),
            86_400,
            Bps::new(500).unwrap(),
            Tokens::new(1_000),
            Bps::new(5_100).unwrap(),
            86_400,
            43_200,
            1_209_600,
            Tokens::new(10_000),
        );
        assert!(bad.is_err());
    }

    #[test]
    fn params_enforce_rate_cap() {
        let bad = Params::new(
            Bps::new(3_000).unwrap(),
            Bps::new(1_001).unwrap(),
            Bps::new(500).unwrap(),
            86_400,
            Bps::new(500).unwrap(),
            Tokens::new(1_000),
            Bps::new(5_100).unwrap(),
            86_400,
            43_200,
            1_209_600,
            Tokens::new(10_000),
        );
        assert!(matches!(
            bad,
            Err(IndentureError::BoundedValueExceeded(_))
        ));
    }

    #[test]
    fn setters_revalidate() {
        let mut p = params();
        assert!(p.set_interest_rate(Bps::new(1_001).unwrap()).is_err());
        assert!(p.set_collateral_ratio(Bps::ZERO).is_err());
        p.set_collateral_ratio(Bps::new(4_000).unwrap()).unwrap();
        assert_eq!(p.unlocked_fraction().get(), 6_000);
    }

    #[test]
    fn bond_id_derivation_is_deterministic_and_nonce_sensitive() {
        let owner = AccountId(crate::Hash32([1; 32]));
        let t = Timestamp(1_700_000_000);
        let a = BondId::derive(owner, t, crate::Hash32([7; 32]));
        let b = BondId::derive(owner, t, crate::Hash32([7; 32]));
        let c = BondId::derive(owner, t, crate::Hash32([8; 32]));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn account_id_hex_round_trips() {
        let id = AccountId(crate::Hash32([0xAB; 32]));
        let hex = id.to_hex();
        assert_eq!(AccountId::from_hex(&hex).unwrap(), id);
        assert!(AccountId::from_hex("zz").is_err());
        assert!(AccountId::from_hex("abcd").is_err());
    }
}
