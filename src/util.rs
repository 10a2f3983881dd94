/// A sort key that is also its own payload.
pub type Token = i64;

/// Direction of the final sorted run.
///
/// Every comparison the sort makes goes through this type, so flipping the
/// order flips the run-boundary test and the merge selection together.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Order {
    /// Non-increasing output, largest token first.
    #[default]
    Descending,
    /// Non-decreasing output, smallest token first.
    Ascending,
}

impl Order {
    /// Whether `next` may follow `prev` inside the same run.
    #[inline]
    pub fn continues_run(self, prev: Token, next: Token) -> bool {
        match self {
            Order::Descending => next <= prev,
            Order::Ascending => next >= prev,
        }
    }

    /// Whether `a` must be written strictly before `b`. Equal tokens never
    /// precede each other, so a merge keeps the first input that offered one.
    #[inline]
    pub fn precedes(self, a: Token, b: Token) -> bool {
        match self {
            Order::Descending => a > b,
            Order::Ascending => a < b,
        }
    }

    /// Whether `tokens` forms a single run under this order.
    pub fn is_sorted(self, tokens: &[Token]) -> bool {
        tokens.windows(2).all(|w| self.continues_run(w[0], w[1]))
    }
}
