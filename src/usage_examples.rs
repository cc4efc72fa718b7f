use rand::seq::IndexedRandom;

pub const USAGE_EXAMPLES: &[&str] = &[
    "howto tar without compression",
    "howto oneline install conda",
    "howto du -hs hidden files",
    "howto download from gcp bucket",
    "howto pull from upstream",
    "howto push if the only update is the tag",
    "howto get ubuntu version",
    "howto undo make",
    "howto connect to mongo running inside docker",
    "howto check if something is running on my port 27017",
    "howto get user id for user alice",
    "howto create user alice with UID 5030 and GID 4030 and a home directory in /mnt/shared_home",
    "howto tree without node_modules",
    "howto 'grep my zsh history and print all examples containing howto (with trailing space)'",
];

/// Picks one example uniformly at random.
pub fn random_example() -> &'static str {
    random_example_with(&mut rand::rng())
}

pub fn random_example_with<R: rand::Rng + ?Sized>(rng: &mut R) -> &'static str {
    USAGE_EXAMPLES.choose(rng).copied().unwrap_or("howto tar without compression")
}
