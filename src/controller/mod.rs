//! The lending cycle controller.
//!
//! A five-state machine that drives the whole bot: check the balance, pick a
//! rate, place a lend offer, wait for it to fill, cancel it if it stalls,
//! repeat forever. States run strictly sequentially; the only concurrency is
//! the poll-vs-timeout race inside `WaitFill`, resolved by a single
//! `tokio::select!` so each cycle handles exactly one of the two events.
//!
//! Every venue failure is absorbed at the state boundary as a log plus a
//! backoff plus a retry from the same or an earlier state. Nothing
//! operational ever propagates out of `run`.

use crate::config::{LendingConfig, TimingConfig};
use crate::exchange::{LendingVenue, VenueError};
use crate::utils::decimal::lendable_amount;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use tokio::time::{sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Smallest lend order KuCoin accepts, in USDT. A platform constant, not
/// configuration.
pub const MINIMUM_ORDER_AMOUNT: Decimal = dec!(10);

/// One state of the lending cycle, carrying the context the state needs.
///
/// The context (amount, rate, order id) travels inside the state value
/// instead of living in loose mutable locals, so a transition is the only
/// way any of it changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleState {
    /// Read the balance and compute the lendable amount.
    CheckBalance,
    /// Fetch the market minimum daily rate for `amount`.
    GetMinRate { amount: Decimal },
    /// Submit a lend offer of `amount` at `rate`.
    CreateOrder { amount: Decimal, rate: Decimal },
    /// Poll the open order until it fills or the timeout fires.
    WaitFill { order_id: String },
    /// Cancel the stalled order, retrying until it is resolved.
    CancelOrder { order_id: String },
}

/// Waits and timeouts between transitions, injectable so tests can run the
/// machine on tokio's paused clock.
#[derive(Debug, Clone)]
pub struct CyclePolicy {
    /// Backoff after a failed balance fetch
    pub balance_retry: Duration,
    /// Wait when the lendable amount is below the platform minimum
    pub insufficient_balance_wait: Duration,
    /// Backoff after a failed rate fetch
    pub rate_retry: Duration,
    /// Interval between fill-status polls
    pub poll_interval: Duration,
    /// Total wait for a fill before cancelling
    pub fill_timeout: Duration,
    /// Backoff between cancel attempts
    pub cancel_retry: Duration,
}

impl Default for CyclePolicy {
    fn default() -> Self {
        Self::from(&TimingConfig::default())
    }
}

impl From<&TimingConfig> for CyclePolicy {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            balance_retry: timing.balance_retry(),
            insufficient_balance_wait: timing.insufficient_balance_wait(),
            rate_retry: timing.rate_retry(),
            poll_interval: timing.poll_interval(),
            fill_timeout: timing.fill_timeout(),
            cancel_retry: timing.cancel_retry(),
        }
    }
}

/// Fill status of the tracked order as observed from the active-order list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FillStatus {
    /// Still listed, not yet fully filled
    Open,
    /// Absent from the listing, so fully filled
    Filled,
}

/// Drives the lending cycle against a `LendingVenue`.
pub struct LendingController<V> {
    venue: V,
    floor_rate: Decimal,
    reserved: Decimal,
    policy: CyclePolicy,
}

impl<V: LendingVenue> LendingController<V> {
    /// Create a controller from the lending policy configuration.
    pub fn new(venue: V, lending: &LendingConfig, policy: CyclePolicy) -> Self {
        Self {
            venue,
            floor_rate: lending.min_daily_rate,
            reserved: lending.reserved_amount,
            policy,
        }
    }

    /// Run the lending cycle forever, starting from `CheckBalance`.
    pub async fn run(&self) {
        let mut state = CycleState::CheckBalance;
        loop {
            state = self.step(state).await;
        }
    }

    /// Execute one state and return the next one.
    ///
    /// Each call resolves a full state visit, including any in-state retry
    /// waiting (`WaitFill` polls until fill or timeout, `CancelOrder`
    /// retries until the order is resolved).
    pub async fn step(&self, state: CycleState) -> CycleState {
        match state {
            CycleState::CheckBalance => self.check_balance().await,
            CycleState::GetMinRate { amount } => self.get_min_rate(amount).await,
            CycleState::CreateOrder { amount, rate } => self.create_order(amount, rate).await,
            CycleState::WaitFill { order_id } => self.wait_fill(order_id).await,
            CycleState::CancelOrder { order_id } => self.cancel_order(order_id).await,
        }
    }

    async fn check_balance(&self) -> CycleState {
        let available = match self.venue.available_balance().await {
            Ok(available) => available,
            Err(error) => {
                warn!(%error, "failed to fetch available balance");
                sleep(self.policy.balance_retry).await;
                return CycleState::CheckBalance;
            }
        };

        let amount = lendable_amount(available, self.reserved);
        if amount < MINIMUM_ORDER_AMOUNT {
            warn!(
                %amount,
                minimum = %MINIMUM_ORDER_AMOUNT,
                "not enough balance to lend, waiting for funds to accrue"
            );
            sleep(self.policy.insufficient_balance_wait).await;
            return CycleState::CheckBalance;
        }

        info!(%available, %amount, "balance checked");
        CycleState::GetMinRate { amount }
    }

    async fn get_min_rate(&self, amount: Decimal) -> CycleState {
        let market_rate = match self.venue.min_daily_rate().await {
            Ok(rate) => rate,
            Err(error) => {
                warn!(%error, "failed to fetch minimum daily rate");
                sleep(self.policy.rate_retry).await;
                return CycleState::GetMinRate { amount };
            }
        };

        let rate = if market_rate < self.floor_rate {
            warn!(
                %market_rate,
                floor = %self.floor_rate,
                "market rate below configured floor, offering at the floor"
            );
            self.floor_rate
        } else {
            market_rate
        };

        CycleState::CreateOrder { amount, rate }
    }

    async fn create_order(&self, amount: Decimal, rate: Decimal) -> CycleState {
        match self.venue.create_lend_order(amount, rate).await {
            Ok(order_id) => {
                info!(%order_id, %amount, %rate, "lend order created");
                CycleState::WaitFill { order_id }
            }
            Err(error) => {
                // The rate may be stale by now, so go back one state.
                warn!(%error, "failed to create lend order");
                CycleState::GetMinRate { amount }
            }
        }
    }

    async fn wait_fill(&self, order_id: String) -> CycleState {
        let mut poll = tokio::time::interval(self.policy.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; consume it so polling starts
        // one full interval after order creation.
        poll.tick().await;

        let timeout = sleep(self.policy.fill_timeout);
        tokio::pin!(timeout);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    match self.fill_status(&order_id).await {
                        Ok(FillStatus::Filled) => {
                            info!(%order_id, "lend order fully filled");
                            return CycleState::CheckBalance;
                        }
                        Ok(FillStatus::Open) => {
                            debug!(%order_id, "lend order still open");
                        }
                        Err(error) => {
                            warn!(%order_id, %error, "failed to check lend order status");
                        }
                    }
                }
                _ = &mut timeout => {
                    warn!(%order_id, "timed out waiting for lend order to fill");
                    return CycleState::CancelOrder { order_id };
                }
            }
        }
    }

    /// Derive the fill status by listing active orders: the order being
    /// absent from the list means it filled completely.
    async fn fill_status(&self, order_id: &str) -> Result<FillStatus, VenueError> {
        let page = self.venue.active_lend_orders(1).await?;

        // The status derivation assumes the whole active set fits one page.
        if page.total_page > 1 {
            return Err(VenueError::TooManyActiveOrders(page.total_page));
        }

        if page.items.iter().any(|order| order.order_id == order_id) {
            Ok(FillStatus::Open)
        } else {
            Ok(FillStatus::Filled)
        }
    }

    async fn cancel_order(&self, order_id: String) -> CycleState {
        // An unresolved order would leave funds stuck outside the cycle, so
        // cancellation is the one operation retried without bound.
        loop {
            match self.venue.cancel_lend_order(&order_id).await {
                Ok(outcome) if outcome.is_resolved() => {
                    info!(%order_id, ?outcome, "lend order filled or cancelled");
                    return CycleState::CheckBalance;
                }
                Ok(outcome) => {
                    warn!(%order_id, ?outcome, "cancel not accepted, retrying");
                }
                Err(error) => {
                    warn!(%order_id, %error, "failed to cancel lend order");
                }
            }
            sleep(self.policy.cancel_retry).await;
        }
    }
}
