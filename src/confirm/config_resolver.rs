//! Confirmation config resolution.
//!
//! Three layers feed the effective config: the crate default, the
//! account's stored preference, and the per-operation override. Whole
//! configs win, not individual fields. The winner is then normalized
//! into a coherent mode/behavior/delay triple and finally clamped for
//! embedded callers on registration-grade flows.

use log::{debug, warn};

use crate::config::DEFAULT_AUTO_PROCEED_DELAY_MS;
use crate::confirm::flow::FlowType;
use crate::types::{ConfirmationBehavior, ConfirmationConfig, ConfirmationUIMode};

/// Where the embedding application runs relative to the wallet origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerContext {
    /// Wallet-origin caller; its config is taken at face value.
    TopLevel,
    /// Cross-origin iframe host; registration-grade flows get clamped
    /// to an explicit click unless the caller opted out of UI.
    Embedded,
}

/// Rewrite incoherent combinations instead of rejecting them.
///
/// Skip implies auto-proceed with zero delay. A visible prompt that
/// waits for a click has no use for a delay. Auto-proceed without a
/// delay gets the default so the UI stays visible long enough to read.
pub fn normalize_confirmation_config(config: &ConfirmationConfig) -> ConfirmationConfig {
    let mut normalized = config.clone();

    match normalized.ui_mode {
        ConfirmationUIMode::Skip => {
            normalized.behavior = ConfirmationBehavior::AutoProceed;
            normalized.auto_proceed_delay = Some(0);
        }
        ConfirmationUIMode::Modal | ConfirmationUIMode::Drawer => match normalized.behavior {
            ConfirmationBehavior::RequireClick => {
                if normalized.auto_proceed_delay.is_some() {
                    debug!("requireClick behavior ignores autoProceedDelay; clearing it");
                    normalized.auto_proceed_delay = None;
                }
            }
            ConfirmationBehavior::AutoProceed | ConfirmationBehavior::AutoProceedWithDelay => {
                if normalized.auto_proceed_delay.is_none() {
                    normalized.auto_proceed_delay = Some(DEFAULT_AUTO_PROCEED_DELAY_MS);
                }
            }
        },
    }

    normalized
}

/// Pick the winning config, normalize it, and apply flow and caller
/// clamps. `override_config` is the per-operation request field,
/// `stored` the account preference.
pub fn resolve_confirmation_config(
    flow: FlowType,
    caller: CallerContext,
    override_config: Option<&ConfirmationConfig>,
    stored: Option<&ConfirmationConfig>,
) -> ConfirmationConfig {
    let chosen = override_config
        .or(stored)
        .cloned()
        .unwrap_or_default();

    let mut resolved = normalize_confirmation_config(&chosen);

    if flow == FlowType::LocalOnly {
        // Decrypt-for-export never prompts; the assertion itself is the gate.
        resolved.ui_mode = ConfirmationUIMode::Skip;
        resolved.behavior = ConfirmationBehavior::AutoProceed;
        resolved.auto_proceed_delay = Some(0);
        return resolved;
    }

    let opted_out_of_click = resolved.ui_mode == ConfirmationUIMode::Skip
        || resolved.behavior == ConfirmationBehavior::AutoProceed;

    if caller == CallerContext::Embedded && flow.is_registration_grade() && !opted_out_of_click {
        if resolved.ui_mode != ConfirmationUIMode::Modal
            || resolved.behavior != ConfirmationBehavior::RequireClick
        {
            warn!(
                "Embedded caller on {} flow; forcing modal confirmation",
                flow.wire_name()
            );
        }
        resolved.ui_mode = ConfirmationUIMode::Modal;
        resolved.behavior = ConfirmationBehavior::RequireClick;
        resolved.auto_proceed_delay = None;
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(
        ui_mode: ConfirmationUIMode,
        behavior: ConfirmationBehavior,
        delay: Option<u32>,
    ) -> ConfirmationConfig {
        ConfirmationConfig {
            ui_mode,
            behavior,
            auto_proceed_delay: delay,
            theme: None,
        }
    }

    #[test]
    fn skip_mode_forces_auto_proceed_with_zero_delay() {
        let normalized = normalize_confirmation_config(&config(
            ConfirmationUIMode::Skip,
            ConfirmationBehavior::RequireClick,
            Some(5000),
        ));
        assert_eq!(normalized.behavior, ConfirmationBehavior::AutoProceed);
        assert_eq!(normalized.auto_proceed_delay, Some(0));
    }

    #[test]
    fn require_click_drops_stale_delay() {
        let normalized = normalize_confirmation_config(&config(
            ConfirmationUIMode::Modal,
            ConfirmationBehavior::RequireClick,
            Some(3000),
        ));
        assert_eq!(normalized.auto_proceed_delay, None);
    }

    #[test]
    fn auto_proceed_without_delay_gets_default() {
        for behavior in [
            ConfirmationBehavior::AutoProceed,
            ConfirmationBehavior::AutoProceedWithDelay,
        ] {
            let normalized =
                normalize_confirmation_config(&config(ConfirmationUIMode::Drawer, behavior, None));
            assert_eq!(
                normalized.auto_proceed_delay,
                Some(DEFAULT_AUTO_PROCEED_DELAY_MS)
            );
        }
    }

    #[test]
    fn override_beats_stored_beats_default() {
        let stored = config(
            ConfirmationUIMode::Drawer,
            ConfirmationBehavior::AutoProceed,
            Some(1000),
        );
        let override_config = config(
            ConfirmationUIMode::Modal,
            ConfirmationBehavior::RequireClick,
            None,
        );

        let resolved = resolve_confirmation_config(
            FlowType::Signing,
            CallerContext::TopLevel,
            Some(&override_config),
            Some(&stored),
        );
        assert_eq!(resolved.ui_mode, ConfirmationUIMode::Modal);
        assert_eq!(resolved.behavior, ConfirmationBehavior::RequireClick);

        let resolved = resolve_confirmation_config(
            FlowType::Signing,
            CallerContext::TopLevel,
            None,
            Some(&stored),
        );
        assert_eq!(resolved.ui_mode, ConfirmationUIMode::Drawer);
        assert_eq!(resolved.auto_proceed_delay, Some(1000));

        let resolved =
            resolve_confirmation_config(FlowType::Signing, CallerContext::TopLevel, None, None);
        assert_eq!(resolved.ui_mode, ConfirmationUIMode::Modal);
        assert_eq!(resolved.behavior, ConfirmationBehavior::RequireClick);
        assert_eq!(resolved.auto_proceed_delay, None);
    }

    #[test]
    fn local_only_always_skips() {
        let loud = config(
            ConfirmationUIMode::Modal,
            ConfirmationBehavior::RequireClick,
            None,
        );
        let resolved = resolve_confirmation_config(
            FlowType::LocalOnly,
            CallerContext::Embedded,
            Some(&loud),
            None,
        );
        assert_eq!(resolved.ui_mode, ConfirmationUIMode::Skip);
        assert_eq!(resolved.behavior, ConfirmationBehavior::AutoProceed);
        assert_eq!(resolved.auto_proceed_delay, Some(0));
    }

    #[test]
    fn embedded_registration_is_clamped_to_modal_click() {
        let drawer_delay = config(
            ConfirmationUIMode::Drawer,
            ConfirmationBehavior::AutoProceedWithDelay,
            Some(500),
        );
        let resolved = resolve_confirmation_config(
            FlowType::Registration,
            CallerContext::Embedded,
            Some(&drawer_delay),
            None,
        );
        assert_eq!(resolved.ui_mode, ConfirmationUIMode::Modal);
        assert_eq!(resolved.behavior, ConfirmationBehavior::RequireClick);
        assert_eq!(resolved.auto_proceed_delay, None);
    }

    #[test]
    fn explicit_opt_out_bypasses_the_clamp() {
        let skip = config(
            ConfirmationUIMode::Skip,
            ConfirmationBehavior::AutoProceed,
            None,
        );
        let resolved = resolve_confirmation_config(
            FlowType::LinkDevice,
            CallerContext::Embedded,
            Some(&skip),
            None,
        );
        assert_eq!(resolved.ui_mode, ConfirmationUIMode::Skip);

        let auto = config(
            ConfirmationUIMode::Modal,
            ConfirmationBehavior::AutoProceed,
            None,
        );
        let resolved = resolve_confirmation_config(
            FlowType::LinkDevice,
            CallerContext::Embedded,
            Some(&auto),
            None,
        );
        assert_eq!(resolved.behavior, ConfirmationBehavior::AutoProceed);
    }

    #[test]
    fn top_level_registration_is_not_clamped() {
        let drawer = config(
            ConfirmationUIMode::Drawer,
            ConfirmationBehavior::RequireClick,
            None,
        );
        let resolved = resolve_confirmation_config(
            FlowType::Registration,
            CallerContext::TopLevel,
            Some(&drawer),
            None,
        );
        assert_eq!(resolved.ui_mode, ConfirmationUIMode::Drawer);
    }
}
