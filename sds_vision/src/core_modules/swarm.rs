// THEORY:
// The `swarm` module is the search engine: Stochastic Diffusion Search (SDS). A
// population of simple agents each holds a candidate hypothesis (an index into the
// hypothesis pool) and a single bit of state, active or inactive. Each agent only
// ever checks one cheap, random micro-test per iteration, yet the population as a
// whole converges on the hypothesis that passes the largest share of all tests.
//
// The "standard" configuration implemented here is:
// 1.  **Uniform hypothesis draw**: fresh hypotheses are picked uniformly from the
//     pool.
// 2.  **Passive diffusion**: every inactive agent polls one random agent. If that
//     agent is active its hypothesis is copied, otherwise a fresh one is drawn.
//     Active agents keep their hypothesis.
// 3.  **Uniform boolean test**: every agent draws one micro-test index uniformly
//     and becomes active iff the test passes for its hypothesis.
// 4.  **Synchronous iteration**: the whole diffusion phase runs before the whole
//     test phase.
// 5.  **Fixed halting**: the search stops after a fixed number of iterations.
//
// The result is read from the swarm as its largest cluster: the hypothesis shared by
// the most active agents.
//
// The module is generic over the hypothesis type and depends on the micro-tests only
// through the `Microtests` trait. All randomness comes from the caller's `Rng`.

use crate::core_modules::microtest::Microtests;
use crate::error::SwarmError;
use rand::Rng;
use std::collections::HashMap;
use tracing::debug;

/// A single searcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Agent {
    /// Index into the hypothesis pool, `None` until the first diffusion phase.
    pub hypothesis: Option<usize>,
    /// Whether the last test this agent ran passed.
    pub active: bool,
}

/// A group of agents sharing one hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cluster {
    pub hypothesis: usize,
    pub size: usize,
}

/// The agent population.
#[derive(Debug, Clone)]
pub struct Swarm {
    agents: Vec<Agent>,
}

impl Swarm {
    /// A swarm of `agent_count` inactive agents with no hypothesis.
    pub fn new(agent_count: usize) -> Self {
        Self {
            agents: vec![Agent::default(); agent_count],
        }
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.agents.iter().filter(|agent| agent.active).count()
    }

    /// The hypothesis held by the most active agents.
    ///
    /// Ties go to the hypothesis that appears first in agent order. When no agent is
    /// active the most common hypothesis overall is returned instead.
    pub fn largest_cluster(&self) -> Option<Cluster> {
        Self::most_common(self.agents.iter().filter(|agent| agent.active))
            .or_else(|| Self::most_common(self.agents.iter()))
    }

    fn most_common<'a>(agents: impl Iterator<Item = &'a Agent>) -> Option<Cluster> {
        let mut counts: HashMap<usize, (usize, usize)> = HashMap::new();
        for (order, hypothesis) in agents.filter_map(|agent| agent.hypothesis).enumerate() {
            counts.entry(hypothesis).or_insert((0, order)).0 += 1;
        }
        counts
            .into_iter()
            .max_by(|(_, (size_a, first_a)), (_, (size_b, first_b))| {
                size_a.cmp(size_b).then(first_b.cmp(first_a))
            })
            .map(|(hypothesis, (size, _))| Cluster { hypothesis, size })
    }
}

/// Configuration for one standard SDS run.
#[derive(Debug, Clone, Copy)]
pub struct SdsConfig {
    pub max_iterations: usize,
}

/// Standard SDS over a hypothesis pool and a micro-test family.
pub struct StandardSds<'a, H, M> {
    hypotheses: &'a [H],
    microtests: &'a M,
    config: SdsConfig,
}

impl<'a, H, M: Microtests<H>> StandardSds<'a, H, M> {
    pub fn new(hypotheses: &'a [H], microtests: &'a M, config: SdsConfig) -> Self {
        Self {
            hypotheses,
            microtests,
            config,
        }
    }

    /// Runs the fixed iteration budget on `swarm`.
    pub fn run<R: Rng + ?Sized>(&self, swarm: &mut Swarm, rng: &mut R) -> Result<(), SwarmError> {
        if swarm.is_empty() {
            return Err(SwarmError::NoAgents);
        }
        if self.hypotheses.is_empty() {
            return Err(SwarmError::NoHypotheses);
        }
        if self.microtests.size() == 0 {
            return Err(SwarmError::NoMicrotests);
        }

        for iteration in 0..self.config.max_iterations {
            self.iterate(swarm, rng)?;
            debug!(iteration, active = swarm.active_count(), "sds iteration");
        }
        Ok(())
    }

    /// One synchronous iteration: diffuse every agent, then test every agent.
    pub fn iterate<R: Rng + ?Sized>(&self, swarm: &mut Swarm, rng: &mut R) -> Result<(), SwarmError> {
        self.diffuse(swarm, rng);
        self.test(swarm, rng)
    }

    fn diffuse<R: Rng + ?Sized>(&self, swarm: &mut Swarm, rng: &mut R) {
        // Polls read the state from before this phase.
        let snapshot = swarm.agents.clone();
        for agent in swarm.agents.iter_mut().filter(|agent| !agent.active) {
            let polled = snapshot[rng.gen_range(0..snapshot.len())];
            agent.hypothesis = if polled.active {
                polled.hypothesis
            } else {
                Some(rng.gen_range(0..self.hypotheses.len()))
            };
        }
    }

    fn test<R: Rng + ?Sized>(&self, swarm: &mut Swarm, rng: &mut R) -> Result<(), SwarmError> {
        let size = self.microtests.size();
        for agent in swarm.agents.iter_mut() {
            let Some(hypothesis) = agent.hypothesis else {
                agent.active = false;
                continue;
            };
            let index = rng.gen_range(0..size);
            agent.active = self.microtests.run(index, &self.hypotheses[hypothesis])?;
        }
        Ok(())
    }
}
