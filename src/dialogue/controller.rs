use std::sync::Arc;

use crate::barter::BarterDefinition;

use super::host::ConversationHost;

// ============================================================================
// Conversation Phases
// ============================================================================

/// Where a conversation currently stands.
///
/// Phases only ever move forward, one step per advance signal. Confirm is
/// transient: handling it always ends in Terminated, whatever the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationPhase {
    /// Controller created, nothing shown yet.
    NotStarted,
    /// Greeting shown, awaiting the continue option.
    Greeting,
    /// Numeric prompt shown, awaiting the player's selection.
    Offer,
    /// Selection received and being handled.
    Confirm,
    Terminated,
}

impl ConversationPhase {
    fn next(self) -> ConversationPhase {
        match self {
            ConversationPhase::NotStarted => ConversationPhase::Greeting,
            ConversationPhase::Greeting => ConversationPhase::Offer,
            ConversationPhase::Offer => ConversationPhase::Confirm,
            ConversationPhase::Confirm | ConversationPhase::Terminated => {
                ConversationPhase::Terminated
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationPhase::NotStarted => "not_started",
            ConversationPhase::Greeting => "greeting",
            ConversationPhase::Offer => "offer",
            ConversationPhase::Confirm => "confirm",
            ConversationPhase::Terminated => "terminated",
        }
    }
}

// ============================================================================
// Conversation Signals
// ============================================================================

/// One decoded player input for an active conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationSignal {
    /// Continue the dialogue. Carries the prompt selection when one was
    /// requested; a stray value at any other step is ignored.
    Advance { selection: Option<i32> },
    /// Close the dialogue. Valid in any phase, never mutates anything.
    Cancel,
}

// ============================================================================
// Conversation Controller
// ============================================================================

/// Drives one barter dialogue for one player session.
///
/// A controller lives for at most four round-trips: greeting, offer prompt,
/// confirmation, done. Every failure path terminates the conversation; the
/// player starts over by interacting again. The single debit/credit pair can
/// only happen inside the Confirm step, and the controller terminates
/// immediately afterwards, so an instance can never exchange twice.
pub struct ConversationController {
    barter: Arc<BarterDefinition>,
    phase: ConversationPhase,
}

impl ConversationController {
    pub fn new(barter: Arc<BarterDefinition>) -> Self {
        Self {
            barter,
            phase: ConversationPhase::NotStarted,
        }
    }

    pub fn phase(&self) -> ConversationPhase {
        self.phase
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == ConversationPhase::Terminated
    }

    pub fn barter_id(&self) -> &str {
        &self.barter.id
    }

    /// Feed one player signal through the state machine.
    pub fn handle(&mut self, signal: ConversationSignal, host: &mut dyn ConversationHost) {
        if self.phase == ConversationPhase::Terminated {
            return;
        }

        let selection = match signal {
            ConversationSignal::Cancel => {
                self.phase = ConversationPhase::Terminated;
                host.terminate();
                return;
            }
            ConversationSignal::Advance { selection } => selection,
        };

        self.phase = self.phase.next();
        match self.phase {
            ConversationPhase::Greeting => self.greet(host),
            ConversationPhase::Offer => self.offer(host),
            ConversationPhase::Confirm => self.confirm(selection, host),
            ConversationPhase::NotStarted | ConversationPhase::Terminated => {}
        }
    }

    fn greet(&mut self, host: &mut dyn ConversationHost) {
        host.present_message(
            &self.barter.greeting_text,
            std::slice::from_ref(&self.barter.offer_option),
        );
    }

    fn offer(&mut self, host: &mut dyn ConversationHost) {
        let held = host.item_quantity(&self.barter.source_item);
        if held < self.barter.units_per_target {
            host.present_message(&self.barter.insufficient_text, &[]);
            self.dispose(host);
            return;
        }

        let max = self.barter.max_for_quantity(held);
        host.present_numeric_prompt(&self.barter.prompt_text, max, 1, max);
    }

    fn confirm(&mut self, selection: Option<i32>, host: &mut dyn ConversationHost) {
        // Holdings may have changed since the prompt was shown, so the valid
        // range is recomputed from the current quantity.
        let held = host.item_quantity(&self.barter.source_item);
        let max_units = held / self.barter.units_per_target;

        // An out-of-range (or missing) selection disposes without a word;
        // only a space shortage gets an explanation.
        let units = match selection {
            Some(s) if s >= 1 && s <= max_units => s,
            _ => {
                self.dispose(host);
                return;
            }
        };

        if !host.has_capacity(&self.barter.target_item, units) {
            host.present_message(&self.barter.no_space_text, &[]);
            self.dispose(host);
            return;
        }

        let debit = units * self.barter.units_per_target;
        if let Err(e) = host.mutate_item(&self.barter.source_item, -debit) {
            tracing::error!(
                "Barter {}: debit of {} {} failed: {}",
                self.barter.id, debit, self.barter.source_item, e
            );
            host.present_message(&self.barter.failed_text, &[]);
            self.dispose(host);
            return;
        }

        if let Err(e) = host.mutate_item(&self.barter.target_item, units) {
            // Put the debited items back so the player is never left
            // half-exchanged.
            tracing::error!(
                "Barter {}: credit of {} {} failed: {}",
                self.barter.id, units, self.barter.target_item, e
            );
            if let Err(e) = host.mutate_item(&self.barter.source_item, debit) {
                tracing::error!(
                    "Barter {}: failed to restore {} {}: {}",
                    self.barter.id, debit, self.barter.source_item, e
                );
            }
            host.present_message(&self.barter.failed_text, &[]);
            self.dispose(host);
            return;
        }

        host.present_message(&self.barter.thanks_text, &[]);
        self.dispose(host);
    }

    fn dispose(&mut self, host: &mut dyn ConversationHost) {
        self.phase = ConversationPhase::Terminated;
        host.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory host: a bag of item counts, a receive-space budget, and a
    /// log of everything the controller presented.
    struct FakeHost {
        items: HashMap<String, i32>,
        space: i32,
        messages: Vec<(String, usize)>,
        prompts: Vec<(i32, i32, i32)>,
        mutations: Vec<(String, i32)>,
        terminated: bool,
        fail_credit_of: Option<String>,
    }

    impl FakeHost {
        fn new(leaves: i32) -> Self {
            let mut items = HashMap::new();
            items.insert("maple_leaf".to_string(), leaves);
            Self {
                items,
                space: i32::MAX,
                messages: Vec::new(),
                prompts: Vec::new(),
                mutations: Vec::new(),
                terminated: false,
                fail_credit_of: None,
            }
        }

        fn quantity(&self, item_id: &str) -> i32 {
            self.items.get(item_id).copied().unwrap_or(0)
        }
    }

    impl ConversationHost for FakeHost {
        fn present_message(&mut self, text: &str, options: &[String]) {
            self.messages.push((text.to_string(), options.len()));
        }

        fn present_numeric_prompt(&mut self, _text: &str, default: i32, min: i32, max: i32) {
            self.prompts.push((default, min, max));
        }

        fn item_quantity(&self, item_id: &str) -> i32 {
            self.quantity(item_id)
        }

        fn has_capacity(&self, _item_id: &str, quantity: i32) -> bool {
            quantity <= self.space
        }

        fn mutate_item(&mut self, item_id: &str, delta: i32) -> Result<(), String> {
            if delta > 0 && self.fail_credit_of.as_deref() == Some(item_id) {
                return Err("storage rejected the credit".to_string());
            }
            let current = self.quantity(item_id);
            let updated = current + delta;
            if updated < 0 {
                return Err(format!("{} would go negative", item_id));
            }
            self.items.insert(item_id.to_string(), updated);
            self.mutations.push((item_id.to_string(), delta));
            Ok(())
        }

        fn terminate(&mut self) {
            self.terminated = true;
        }
    }

    fn leaf_barter() -> Arc<BarterDefinition> {
        Arc::new(BarterDefinition {
            id: "leaf_exchange".to_string(),
            source_item: "maple_leaf".to_string(),
            target_item: "leaf_token".to_string(),
            units_per_target: 100,
            max_per_exchange: 300,
            greeting_text: "Got leaves?".to_string(),
            offer_option: "I want to trade.".to_string(),
            prompt_text: "How many tokens?".to_string(),
            insufficient_text: "You need at least 100.".to_string(),
            no_space_text: "No room for tokens.".to_string(),
            thanks_text: "Pleasure doing business.".to_string(),
            failed_text: "The trade fell through.".to_string(),
        })
    }

    fn advance(controller: &mut ConversationController, host: &mut FakeHost) {
        controller.handle(ConversationSignal::Advance { selection: None }, host);
    }

    fn advance_with(controller: &mut ConversationController, host: &mut FakeHost, s: i32) {
        controller.handle(
            ConversationSignal::Advance {
                selection: Some(s),
            },
            host,
        );
    }

    #[test]
    fn test_greeting_presents_single_continuation() {
        let mut host = FakeHost::new(250);
        let mut controller = ConversationController::new(leaf_barter());

        advance(&mut controller, &mut host);

        assert_eq!(controller.phase(), ConversationPhase::Greeting);
        assert_eq!(host.messages.len(), 1);
        assert_eq!(host.messages[0], ("Got leaves?".to_string(), 1));
        assert!(!host.terminated);
    }

    #[test]
    fn test_offer_rejects_below_one_unit() {
        let mut host = FakeHost::new(50);
        let mut controller = ConversationController::new(leaf_barter());

        advance(&mut controller, &mut host);
        advance(&mut controller, &mut host);

        assert!(controller.is_terminated());
        assert!(host.terminated);
        assert!(host.prompts.is_empty());
        assert!(host.mutations.is_empty());
        assert_eq!(host.messages.last().unwrap().0, "You need at least 100.");
    }

    #[test]
    fn test_prompt_bounds_follow_holdings() {
        let mut host = FakeHost::new(250);
        let mut controller = ConversationController::new(leaf_barter());

        advance(&mut controller, &mut host);
        advance(&mut controller, &mut host);

        // 250 leaves buy at most 2 tokens; default sits at the max.
        assert_eq!(host.prompts, vec![(2, 1, 2)]);
        assert_eq!(controller.phase(), ConversationPhase::Offer);
    }

    #[test]
    fn test_prompt_cap_binds_large_holdings() {
        let mut host = FakeHost::new(40000);
        let mut controller = ConversationController::new(leaf_barter());

        advance(&mut controller, &mut host);
        advance(&mut controller, &mut host);

        assert_eq!(host.prompts, vec![(300, 1, 300)]);
    }

    #[test]
    fn test_full_exchange_debits_and_credits_once() {
        let mut host = FakeHost::new(300);
        let mut controller = ConversationController::new(leaf_barter());

        advance(&mut controller, &mut host);
        advance(&mut controller, &mut host);
        advance_with(&mut controller, &mut host, 3);

        assert!(controller.is_terminated());
        assert_eq!(host.quantity("maple_leaf"), 0);
        assert_eq!(host.quantity("leaf_token"), 3);
        assert_eq!(
            host.mutations,
            vec![
                ("maple_leaf".to_string(), -300),
                ("leaf_token".to_string(), 3)
            ]
        );
        assert_eq!(host.messages.last().unwrap().0, "Pleasure doing business.");
    }

    #[test]
    fn test_zero_selection_rejected_silently() {
        let mut host = FakeHost::new(300);
        let mut controller = ConversationController::new(leaf_barter());

        advance(&mut controller, &mut host);
        advance(&mut controller, &mut host);
        let shown = host.messages.len();
        advance_with(&mut controller, &mut host, 0);

        assert!(controller.is_terminated());
        assert!(host.mutations.is_empty());
        // Silent: nothing further was presented.
        assert_eq!(host.messages.len(), shown);
    }

    #[test]
    fn test_selection_above_range_rejected_silently() {
        let mut host = FakeHost::new(250);
        let mut controller = ConversationController::new(leaf_barter());

        advance(&mut controller, &mut host);
        advance(&mut controller, &mut host);
        let shown = host.messages.len();
        advance_with(&mut controller, &mut host, 3);

        assert!(controller.is_terminated());
        assert!(host.mutations.is_empty());
        assert_eq!(host.messages.len(), shown);
    }

    #[test]
    fn test_missing_selection_rejected_silently() {
        let mut host = FakeHost::new(300);
        let mut controller = ConversationController::new(leaf_barter());

        advance(&mut controller, &mut host);
        advance(&mut controller, &mut host);
        advance(&mut controller, &mut host);

        assert!(controller.is_terminated());
        assert!(host.mutations.is_empty());
    }

    #[test]
    fn test_capacity_shortage_reports_and_terminates() {
        let mut host = FakeHost::new(300);
        host.space = 1;
        let mut controller = ConversationController::new(leaf_barter());

        advance(&mut controller, &mut host);
        advance(&mut controller, &mut host);
        advance_with(&mut controller, &mut host, 2);

        assert!(controller.is_terminated());
        assert!(host.mutations.is_empty());
        assert_eq!(host.messages.last().unwrap().0, "No room for tokens.");
    }

    #[test]
    fn test_holdings_drop_between_prompts_narrows_range() {
        let mut host = FakeHost::new(300);
        let mut controller = ConversationController::new(leaf_barter());

        advance(&mut controller, &mut host);
        advance(&mut controller, &mut host);
        assert_eq!(host.prompts, vec![(3, 1, 3)]);

        // Leaves vanished while the prompt was open; 3 is no longer valid.
        host.items.insert("maple_leaf".to_string(), 100);
        advance_with(&mut controller, &mut host, 3);

        assert!(controller.is_terminated());
        assert!(host.mutations.is_empty());
    }

    #[test]
    fn test_cancel_closes_without_mutation() {
        let mut host = FakeHost::new(300);
        let mut controller = ConversationController::new(leaf_barter());

        advance(&mut controller, &mut host);
        let shown = host.messages.len();
        controller.handle(ConversationSignal::Cancel, &mut host);

        assert!(controller.is_terminated());
        assert!(host.terminated);
        assert!(host.mutations.is_empty());
        assert_eq!(host.messages.len(), shown);
    }

    #[test]
    fn test_signals_after_termination_are_ignored() {
        let mut host = FakeHost::new(300);
        let mut controller = ConversationController::new(leaf_barter());

        advance(&mut controller, &mut host);
        advance(&mut controller, &mut host);
        advance_with(&mut controller, &mut host, 3);
        assert!(controller.is_terminated());

        let mutations = host.mutations.len();
        let messages = host.messages.len();
        advance_with(&mut controller, &mut host, 3);
        advance(&mut controller, &mut host);
        controller.handle(ConversationSignal::Cancel, &mut host);

        assert_eq!(host.mutations.len(), mutations);
        assert_eq!(host.messages.len(), messages);
    }

    #[test]
    fn test_credit_failure_restores_debit() {
        let mut host = FakeHost::new(300);
        host.fail_credit_of = Some("leaf_token".to_string());
        let mut controller = ConversationController::new(leaf_barter());

        advance(&mut controller, &mut host);
        advance(&mut controller, &mut host);
        advance_with(&mut controller, &mut host, 2);

        assert!(controller.is_terminated());
        assert_eq!(host.quantity("maple_leaf"), 300);
        assert_eq!(host.quantity("leaf_token"), 0);
        assert_eq!(host.messages.last().unwrap().0, "The trade fell through.");
    }
}
