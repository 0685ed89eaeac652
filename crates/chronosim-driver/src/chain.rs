//! Self-rescheduling publish chain.
//!
//! A chain publishes counter 1, then 2, and so on, one step per timer, until
//! it has published its budget. The counter lives in the chain, not in the
//! timer, so the timer only has to name the chain.

use std::fmt;

/// Identifies one publish chain within a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChainId(pub u64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain-{}", self.0)
    }
}

/// Outcome of one chain step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStep {
    /// Publish `counter`, then schedule the next step.
    Continue {
        /// Counter to publish now.
        counter: u64,
    },
    /// Publish `counter`; the chain is done.
    Finished {
        /// Counter to publish now (equal to the budget).
        counter: u64,
    },
}

impl ChainStep {
    /// Counter published by this step.
    pub fn counter(self) -> u64 {
        match self {
            Self::Continue { counter } | Self::Finished { counter } => counter,
        }
    }
}

/// State of one publish chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishChain {
    next_counter: u64,
    budget: u64,
}

impl PublishChain {
    /// A chain that will publish `1..=budget`.
    pub fn new(budget: u64) -> Self {
        Self { next_counter: 1, budget }
    }

    /// Counter the next step will publish.
    pub fn next_counter(&self) -> u64 {
        self.next_counter
    }

    /// Advance the chain by one step.
    ///
    /// The first step always publishes, even for a budget of zero; after that
    /// the chain continues only while the counter is below the budget.
    pub fn step(&mut self) -> ChainStep {
        let counter = self.next_counter;
        if counter < self.budget {
            self.next_counter += 1;
            ChainStep::Continue { counter }
        } else {
            ChainStep::Finished { counter }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_publishes_up_to_budget() {
        let mut chain = PublishChain::new(3);
        assert_eq!(chain.step(), ChainStep::Continue { counter: 1 });
        assert_eq!(chain.step(), ChainStep::Continue { counter: 2 });
        assert_eq!(chain.step(), ChainStep::Finished { counter: 3 });
    }

    #[test]
    fn budget_of_one_finishes_immediately() {
        let mut chain = PublishChain::new(1);
        assert_eq!(chain.step(), ChainStep::Finished { counter: 1 });
    }

    #[test]
    fn finished_chain_does_not_advance() {
        let mut chain = PublishChain::new(1);
        chain.step();
        assert_eq!(chain.next_counter(), 1);
        assert_eq!(chain.step().counter(), 1);
    }
}
