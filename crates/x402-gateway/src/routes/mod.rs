pub mod cowsay;
pub mod events;
pub mod health;
pub mod metrics;
pub mod quote;
pub mod well_known;

/// Quotes served by both paid resources.
pub(crate) const QUOTES: &[&str] = &[
    "The best way to predict the future is to invent it. — Alan Kay",
    "Code is like humor. When you have to explain it, it's bad. — Cory House",
    "Programs must be written for people to read. — Harold Abelson",
    "Simplicity is the ultimate sophistication. — Leonardo da Vinci",
    "Make it work, make it right, make it fast. — Kent Beck",
    "The most dangerous phrase is: we've always done it this way. — Grace Hopper",
    "Walking on water and developing software from a specification are easy if both are frozen. — Edward Berard",
    "Any fool can write code that a computer can understand. Good programmers write code that humans can understand. — Martin Fowler",
];

pub(crate) fn pick_quote() -> &'static str {
    use rand::Rng;
    QUOTES[rand::rng().random_range(0..QUOTES.len())]
}
