use redobj::*;

#[object]
pub struct FloatKey {
    #[pk]
    pub value: f64,
}

fn main() {}
