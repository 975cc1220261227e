mod ring;
pub use ring::Ring;
