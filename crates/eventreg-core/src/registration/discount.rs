use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::{Amount, DiscountQuote, ModuleName};

/// Shown when the server accepts a code without saying anything.
const DEFAULT_APPLIED_MESSAGE: &str = "Discount applied!";

/// Shown when the server rejects a code without a reason.
pub const DEFAULT_REJECTED_MESSAGE: &str = "Invalid discount code";

/// Latest validation outcome for one module's discount code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct DiscountState {
    /// The code that was validated, not whatever is currently typed.
    pub code: String,
    pub valid: bool,
    pub amount: Amount,
    pub message: String,
}

/// Discount outcomes keyed by module. A module with no entry has no discount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountBook {
    entries: HashMap<ModuleName, DiscountState>,
}

impl DiscountBook {
    pub fn get(&self, module: &ModuleName) -> Option<&DiscountState> {
        self.entries.get(module)
    }

    /// Amount to take off `module`, 0 unless its code validated.
    pub fn applied_amount(&self, module: &ModuleName) -> Amount {
        match self.entries.get(module) {
            Some(state) if state.valid => state.amount,
            _ => 0,
        }
    }

    /// Validated codes for the given modules.
    pub fn valid_codes_for(&self, modules: &[ModuleName]) -> BTreeMap<ModuleName, String> {
        modules
            .iter()
            .filter_map(|m| {
                self.entries
                    .get(m)
                    .filter(|state| state.valid && !state.code.is_empty())
                    .map(|state| (m.clone(), state.code.clone()))
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModuleName, &DiscountState)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A validation request handed out by `DiscountValidator::begin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountTicket {
    pub module: ModuleName,
    pub code: String,
    generation: u64,
}

impl DiscountTicket {
    /// Attach the server's answer; `Err` carries the user-facing reason.
    pub fn settle(self, result: Result<DiscountQuote, String>) -> DiscountOutcome {
        DiscountOutcome { ticket: self, result }
    }
}

#[derive(Debug, Clone)]
pub struct DiscountOutcome {
    ticket: DiscountTicket,
    result: Result<DiscountQuote, String>,
}

impl DiscountOutcome {
    pub fn module(&self) -> &ModuleName {
        &self.ticket.module
    }
}

/// Owns the discount book and decides which server answers get recorded.
///
/// Modules never share state. Within a module the most recent `begin` wins:
/// answers for older tickets are dropped when they arrive.
#[derive(Debug, Default)]
pub struct DiscountValidator {
    book: DiscountBook,
    generations: HashMap<ModuleName, u64>,
    in_flight: HashMap<ModuleName, u64>,
}

impl DiscountValidator {
    pub fn book(&self) -> &DiscountBook {
        &self.book
    }

    pub fn is_pending(&self, module: &ModuleName) -> bool {
        self.in_flight.contains_key(module)
    }

    fn bump(&mut self, module: &ModuleName) -> u64 {
        let generation = self.generations.entry(module.clone()).or_insert(0);
        *generation += 1;
        *generation
    }

    /// Start validating `code` for `module`.
    ///
    /// An empty code clears the module's entry, cancels any pending answer and
    /// returns `None`: there is nothing to ask the server.
    pub fn begin(&mut self, module: &ModuleName, code: &str) -> Option<DiscountTicket> {
        let generation = self.bump(module);
        let code = code.trim();
        if code.is_empty() {
            self.book.entries.remove(module);
            self.in_flight.remove(module);
            return None;
        }

        self.in_flight.insert(module.clone(), generation);
        Some(DiscountTicket {
            module: module.clone(),
            code: code.to_string(),
            generation,
        })
    }

    /// Record a server answer. Returns the new state, or `None` when a later
    /// `begin` for the same module superseded this one.
    pub fn apply(&mut self, outcome: DiscountOutcome) -> Option<&DiscountState> {
        let DiscountOutcome { ticket, result } = outcome;
        let current = self.generations.get(&ticket.module).copied().unwrap_or(0);
        if ticket.generation != current {
            return None;
        }
        self.in_flight.remove(&ticket.module);

        let state = match result {
            Ok(quote) => DiscountState {
                code: ticket.code,
                valid: true,
                amount: quote.amount,
                message: quote
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_APPLIED_MESSAGE.to_string()),
            },
            Err(reason) => DiscountState {
                code: ticket.code,
                valid: false,
                amount: 0,
                message: if reason.trim().is_empty() {
                    DEFAULT_REJECTED_MESSAGE.to_string()
                } else {
                    reason
                },
            },
        };

        self.book.entries.insert(ticket.module.clone(), state);
        self.book.entries.get(&ticket.module)
    }
}
