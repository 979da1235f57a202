//! Synthesis of browser-like request identities.
//!
//! Every attempt gets a fresh header set and, for POST, a fresh JSON body, so
//! no two requests look alike on the wire. Nothing here is shared between
//! workers; each owns its generator and RNG.

use rand::rngs::SmallRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_distr::Distribution;
use rand_distr::weighted::WeightedIndex;
use serde_json::{Value, json};

/// User agents with selection weights, roughly matching the engine share of
/// real browser traffic.
const USER_AGENTS: &[(&str, u8)] = &[
    (
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        40,
    ),
    (
        "Mozilla/5.0 (Linux; Android 13; SM-S901U) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.6099.144 Mobile Safari/537.36",
        20,
    ),
    (
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:109.0) Gecko/20100101 Firefox/120.0",
        15,
    ),
    (
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
        15,
    ),
    (
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.144",
        10,
    ),
];

const ACCEPT: &[&str] = &[
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
    "application/json, text/plain, */*",
];

const ACCEPT_ENCODING: &[&str] = &["gzip, deflate, br", "gzip, deflate", "identity"];

const ACCEPT_LANGUAGE: &[&str] = &[
    "en-US,en;q=0.9",
    "id-ID,id;q=0.9,en-US;q=0.8,en;q=0.7",
    "en-GB,en;q=0.9",
];

const FIRST_NAMES: &[&str] = &[
    "Alice", "Bruno", "Clara", "Dimas", "Elena", "Farid", "Greta", "Hugo", "Intan", "Jonas",
];

const LAST_NAMES: &[&str] = &[
    "Anderson", "Becker", "Costa", "Dewi", "Eriksen", "Fischer", "Garcia", "Hartono", "Ivanov",
    "Jensen",
];

const MAIL_DOMAINS: &[&str] = &["gmail.com", "yahoo.com", "hotmail.com", "outlook.com"];

const WORDS: &[&str] = &[
    "quick", "status", "update", "please", "review", "latest", "report", "before", "meeting",
    "thanks", "again", "regards", "question", "about", "delivery", "schedule", "invoice",
];

/// Pools for synthesizing plausible referer URLs.
const REFERER_ADJECTIVES: &[&str] = &["quiet", "sunny", "rapid", "brave", "mellow", "crimson"];
const REFERER_NOUNS: &[&str] = &["river", "harbor", "meadow", "signal", "lantern", "orchard"];
const REFERER_TLDS: &[&str] = &["com", "org", "net", "io"];

/// Per-worker generator of randomized request identities.
///
/// Owns its RNG, so concurrent workers never contend on shared state.
#[derive(Debug)]
pub struct IdentityGenerator {
    rng: SmallRng,
    ua_distribution: WeightedIndex<u8>,
}

impl IdentityGenerator {
    /// Creates a generator with a random seed.
    pub fn new() -> Self {
        Self::seeded(rand::random())
    }

    /// Creates a generator with a fixed seed, for reproducible identities.
    pub fn seeded(seed: u64) -> Self {
        let ua_distribution =
            WeightedIndex::new(USER_AGENTS.iter().map(|(_, weight)| *weight)).unwrap();

        Self {
            rng: SmallRng::seed_from_u64(seed),
            ua_distribution,
        }
    }

    /// Builds the header set for one attempt.
    pub fn headers(&mut self) -> Vec<(&'static str, String)> {
        let user_agent = USER_AGENTS[self.ua_distribution.sample(&mut self.rng)].0;

        vec![
            ("User-Agent", user_agent.to_owned()),
            ("Accept", self.pick(ACCEPT).to_owned()),
            ("Accept-Encoding", self.pick(ACCEPT_ENCODING).to_owned()),
            ("Accept-Language", self.pick(ACCEPT_LANGUAGE).to_owned()),
            ("Connection", "keep-alive".to_owned()),
            ("Cache-Control", "max-age=0".to_owned()),
            ("Referer", self.referer()),
            ("Sec-Fetch-Dest", "document".to_owned()),
            ("Sec-Fetch-Mode", "navigate".to_owned()),
            ("Sec-Fetch-Site", "none".to_owned()),
            ("Sec-Fetch-User", "?1".to_owned()),
            ("Upgrade-Insecure-Requests", "1".to_owned()),
        ]
    }

    /// Builds the JSON body for one POST attempt.
    pub fn body(&mut self) -> Value {
        let first = self.pick(FIRST_NAMES);
        let last = self.pick(LAST_NAMES);
        let number = self.rng.random_range(1..100u32);
        let domain = self.pick(MAIL_DOMAINS);

        json!({
            "name": format!("{first} {last}"),
            "email": format!(
                "{}.{}{number}@{domain}",
                first.to_lowercase(),
                last.to_lowercase(),
            ),
            "message": self.sentence(),
        })
    }

    fn referer(&mut self) -> String {
        format!(
            "https://{}-{}.{}/",
            self.pick(REFERER_ADJECTIVES),
            self.pick(REFERER_NOUNS),
            self.pick(REFERER_TLDS),
        )
    }

    fn sentence(&mut self) -> String {
        let length = self.rng.random_range(5..=10);
        let words: Vec<&str> = (0..length).map(|_| self.pick(WORDS)).collect();

        let mut sentence = words.join(" ");
        if let Some(first) = sentence.get_mut(..1) {
            first.make_ascii_uppercase();
        }
        sentence.push('.');
        sentence
    }

    fn pick(&mut self, pool: &'static [&'static str]) -> &'static str {
        *pool.choose(&mut self.rng).unwrap()
    }
}

impl Default for IdentityGenerator {
    fn default() -> Self {
        Self::new()
    }
}
