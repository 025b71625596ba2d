use std::cell::Cell;
use std::time::Duration;

use chrono::Utc;

use super::client::RewardClient;
use super::{ClaimRequest, RewardAdConfig, RewardClaimResult, RewardError};
use crate::config::RewardMode;
use crate::context::AppContext;

/// Where placement configs come from and claims go to.
pub trait RewardBackend {
    fn config(&self) -> Result<RewardAdConfig, RewardError>;
    fn claim(&self, request: &ClaimRequest) -> Result<RewardClaimResult, RewardError>;
}

impl RewardBackend for RewardClient {
    fn config(&self) -> Result<RewardAdConfig, RewardError> {
        RewardClient::config(self)
    }

    fn claim(&self, request: &ClaimRequest) -> Result<RewardClaimResult, RewardError> {
        RewardClient::claim(self, request)
    }
}

/// Local stand-in for debug builds: fixed placement, claims always succeed.
pub struct SimulatedBackend {
    config: RewardAdConfig,
    balance: Cell<i64>,
}

impl SimulatedBackend {
    pub fn new(reward_amount: i64) -> Self {
        Self {
            config: RewardAdConfig {
                placement_id: "simulated".to_string(),
                reward_amount,
                currency: "coins".to_string(),
                enabled: true,
                requires_authentication: false,
            },
            balance: Cell::new(0),
        }
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new(10)
    }
}

impl RewardBackend for SimulatedBackend {
    fn config(&self) -> Result<RewardAdConfig, RewardError> {
        Ok(self.config.clone())
    }

    fn claim(&self, request: &ClaimRequest) -> Result<RewardClaimResult, RewardError> {
        let balance = self.balance.get() + self.config.reward_amount;
        self.balance.set(balance);
        Ok(RewardClaimResult {
            transaction_id: format!("sim-{}", Utc::now().timestamp_millis()),
            coins_awarded: self.config.reward_amount,
            balance_after: Some(balance),
            unlimited_balance: false,
            reward_id: request.reward_id.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdOutcome {
    /// Watched to the end; carries the ad unit the SDK reported, if any.
    Completed { ad_unit_id: Option<String> },
    Skipped,
}

/// Shows the (real or simulated) rewarded ad.
pub trait AdPresenter {
    fn show(&mut self, config: &RewardAdConfig, duration: Duration) -> AdOutcome;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewardOutcome {
    Claimed(RewardClaimResult),
    Skipped,
}

pub struct RewardFlow {
    backend: Box<dyn RewardBackend>,
    authenticated: bool,
    ad_duration: Duration,
}

impl RewardFlow {
    pub fn new(backend: Box<dyn RewardBackend>, authenticated: bool, ad_duration: Duration) -> Self {
        Self {
            backend,
            authenticated,
            ad_duration,
        }
    }

    /// Pick the backend from the configured [`RewardMode`].
    pub fn for_context(ctx: &AppContext) -> Result<Self, RewardError> {
        let backend: Box<dyn RewardBackend> = match ctx.config.reward_mode {
            RewardMode::Simulated => Box::new(SimulatedBackend::default()),
            RewardMode::Live => Box::new(RewardClient::new(
                ctx.config.reward_api.clone(),
                &ctx.config.user_agent,
                ctx.token(),
            )?),
        };
        log::debug!("reward flow in {} mode", ctx.config.reward_mode);
        Ok(Self::new(backend, ctx.is_authenticated(), ctx.config.ad_duration))
    }

    pub fn run(&self, presenter: &mut dyn AdPresenter) -> Result<RewardOutcome, RewardError> {
        let config = self.backend.config()?;
        if !config.enabled {
            return Err(RewardError::Disabled);
        }
        if config.requires_authentication && !self.authenticated {
            return Err(RewardError::NotAuthenticated);
        }

        match presenter.show(&config, self.ad_duration) {
            AdOutcome::Skipped => {
                log::info!("rewarded ad skipped, nothing claimed");
                Ok(RewardOutcome::Skipped)
            }
            AdOutcome::Completed { ad_unit_id } => {
                let request = ClaimRequest {
                    ad_unit_id: ad_unit_id.or(Some(config.placement_id)),
                    reward_id: None,
                };
                self.backend.claim(&request).map(RewardOutcome::Claimed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Watches(AdOutcome, usize);

    impl AdPresenter for Watches {
        fn show(&mut self, _: &RewardAdConfig, _: Duration) -> AdOutcome {
            self.1 += 1;
            self.0.clone()
        }
    }

    struct FixedConfig(RewardAdConfig);

    impl RewardBackend for FixedConfig {
        fn config(&self) -> Result<RewardAdConfig, RewardError> {
            Ok(self.0.clone())
        }
        fn claim(&self, _: &ClaimRequest) -> Result<RewardClaimResult, RewardError> {
            Err(RewardError::InvalidPayload("unexpected claim".into()))
        }
    }

    fn completed() -> Watches {
        Watches(AdOutcome::Completed { ad_unit_id: None }, 0)
    }

    #[test]
    fn simulated_claims_accumulate() {
        let flow = RewardFlow::new(Box::new(SimulatedBackend::new(5)), false, Duration::ZERO);
        let mut presenter = completed();

        let RewardOutcome::Claimed(first) = flow.run(&mut presenter).unwrap() else {
            panic!("expected a claim");
        };
        let RewardOutcome::Claimed(second) = flow.run(&mut presenter).unwrap() else {
            panic!("expected a claim");
        };
        assert_eq!(first.coins_awarded, 5);
        assert_eq!(second.balance_after, Some(10));
        assert!(second.transaction_id.starts_with("sim-"));
    }

    #[test]
    fn skipped_ad_claims_nothing() {
        let flow = RewardFlow::new(Box::new(SimulatedBackend::default()), true, Duration::ZERO);
        let mut presenter = Watches(AdOutcome::Skipped, 0);
        assert_eq!(flow.run(&mut presenter).unwrap(), RewardOutcome::Skipped);
    }

    #[test]
    fn disabled_or_unauthenticated_never_shows_ad() {
        let mut config = SimulatedBackend::default().config().unwrap();
        config.enabled = false;
        let flow = RewardFlow::new(Box::new(FixedConfig(config.clone())), true, Duration::ZERO);
        let mut presenter = completed();
        assert_eq!(flow.run(&mut presenter), Err(RewardError::Disabled));

        config.enabled = true;
        config.requires_authentication = true;
        let flow = RewardFlow::new(Box::new(FixedConfig(config)), false, Duration::ZERO);
        assert_eq!(flow.run(&mut presenter), Err(RewardError::NotAuthenticated));
        assert_eq!(presenter.1, 0);
    }

    #[test]
    fn claim_errors_propagate() {
        let config = SimulatedBackend::default().config().unwrap();
        let flow = RewardFlow::new(Box::new(FixedConfig(config)), true, Duration::ZERO);
        assert_eq!(
            flow.run(&mut completed()),
            Err(RewardError::InvalidPayload("unexpected claim".into()))
        );
    }
}
