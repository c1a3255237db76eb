//! Curated example conversation topics
//!
//! Used by the `topics` command and as the fallback when `run` is invoked
//! without a topic.

use rand::seq::SliceRandom;

/// Example topics for a two-provider discussion
pub const EXAMPLE_TOPICS: &[&str] = &[
    "Discuss renewable energy",
    "Debate the merits of remote work",
    "Explore how cities could adapt to rising sea levels",
    "Discuss the future of space exploration",
    "Compare different approaches to learning a new language",
    "Discuss whether open source software benefits society",
    "Explore the ethics of autonomous vehicles",
    "Discuss how music influences productivity",
];

/// Pick a random example topic
pub fn random_topic() -> &'static str {
    EXAMPLE_TOPICS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(EXAMPLE_TOPICS[0])
}
