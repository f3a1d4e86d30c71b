pub mod polymarket;

pub use polymarket::{GammaEvent, GammaMarket, PolymarketClient};
