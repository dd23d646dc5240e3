pub mod env;
pub mod telemetry;

/// Token comparison whose running time doesn't depend on where the inputs first differ.
pub fn constant_time_cmp(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let diff = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (l, r)| acc | std::hint::black_box(l ^ r));

    diff == 0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_const_time_cmp() {
        let token = "s3cr3t-internal-token";

        assert!(constant_time_cmp(token, "s3cr3t-internal-token"));
        assert!(!constant_time_cmp(token, "x3cr3t-internal-token"));
        assert!(!constant_time_cmp(token, "s3cr3t-internal-tokex"));
        assert!(!constant_time_cmp(token, "s3cr3t-internal-toke"));
        assert!(!constant_time_cmp(token, ""));
    }
}
