use labrpc::anyhow::{ensure, Result};

/// Residue of an integer key modulo `n`, always in `0..n`.
///
/// The key is read like an integer literal of any length: surrounding
/// whitespace is ignored and a leading sign is allowed. Negative keys wrap
/// around, so `-1` lands on `n - 1`.
pub fn key_to_shard(key: &str, n: usize) -> Result<usize> {
    ensure!(n > 0, "no servers to shard {:?} over", key);
    let s = key.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    ensure!(
        !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
        "key {:?} is not an integer",
        key
    );

    let n = n as u128;
    let r = digits
        .bytes()
        .fold(0u128, |acc, b| (acc * 10 + u128::from(b - b'0')) % n);
    let r = if negative && r != 0 { n - r } else { r };
    Ok(r as usize)
}

/// Servers responsible for one key: the primary and the `nreplicas - 1`
/// servers after it, wrapping around the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shard {
    primary: usize,
    nservers: usize,
    nreplicas: usize,
}

impl Shard {
    /// Placement of `key` over `nservers` servers with `nreplicas` copies.
    pub fn of(key: &str, nservers: usize, nreplicas: usize) -> Result<Self> {
        ensure!(
            (1..=nservers).contains(&nreplicas),
            "cannot place {} replicas on {} servers",
            nreplicas,
            nservers
        );
        Ok(Self {
            primary: key_to_shard(key, nservers)?,
            nservers,
            nreplicas,
        })
    }

    /// The only server that applies writes for this key.
    pub fn primary(&self) -> usize {
        self.primary
    }

    /// Responsible servers, primary first.
    pub fn replicas(&self) -> impl Iterator<Item = usize> {
        let Self {
            primary,
            nservers,
            nreplicas,
        } = *self;
        (0..nreplicas).map(move |i| (primary + i) % nservers)
    }

    /// Whether server `id` is responsible for this key.
    pub fn contains(&self, id: usize) -> bool {
        id < self.nservers && (id + self.nservers - self.primary) % self.nservers < self.nreplicas
    }
}
