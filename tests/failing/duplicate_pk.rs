use redobj::*;

#[object]
pub struct TwoKeys {
    #[pk]
    pub first: i64,
    #[pk]
    pub second: i64,
}

fn main() {}
