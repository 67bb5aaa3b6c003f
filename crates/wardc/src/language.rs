pub const LANG_ID: &str = "ward-core@0.1.0";

pub mod limits {
    pub const MAX_BODY_DEPTH: u32 = 255;
    pub const MAX_EXPR_DEPTH: u32 = 255;
    pub const MAX_TEMPS: u32 = 10_000;
    pub const MAX_IO_MANIPS: u32 = 10_000;
    pub const MAX_JUMP_TARGETS: u32 = 1_000_000;
    /// Exclusive: the counter may reach `MAX_SUSPENSION_POINTS - 1`.
    pub const MAX_SUSPENSION_POINTS: u32 = u32::MAX;
    pub const MAX_INPUT_BYTES: usize = 64 * 1024 * 1024;

    /// Resource ceilings applied while lowering one package.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Limits {
        pub max_body_depth: u32,
        pub max_expr_depth: u32,
        pub max_temps: u32,
        pub max_io_manips: u32,
        pub max_jump_targets: u32,
        pub max_suspension_points: u32,
        pub max_input_bytes: usize,
    }

    impl Default for Limits {
        fn default() -> Self {
            Self {
                max_body_depth: MAX_BODY_DEPTH,
                max_expr_depth: MAX_EXPR_DEPTH,
                max_temps: MAX_TEMPS,
                max_io_manips: MAX_IO_MANIPS,
                max_jump_targets: MAX_JUMP_TARGETS,
                max_suspension_points: MAX_SUSPENSION_POINTS,
                max_input_bytes: MAX_INPUT_BYTES,
            }
        }
    }

    impl Limits {
        /// Defaults, overridden by any valid `WARDC_MAX_*` environment variable.
        pub fn from_env() -> Self {
            Self {
                max_body_depth: env_or("WARDC_MAX_BODY_DEPTH", MAX_BODY_DEPTH),
                max_expr_depth: env_or("WARDC_MAX_EXPR_DEPTH", MAX_EXPR_DEPTH),
                max_temps: env_or("WARDC_MAX_TEMPS", MAX_TEMPS),
                max_io_manips: env_or("WARDC_MAX_IO_MANIPS", MAX_IO_MANIPS),
                max_jump_targets: MAX_JUMP_TARGETS,
                max_suspension_points: MAX_SUSPENSION_POINTS,
                max_input_bytes: env_or("WARDC_MAX_INPUT_BYTES", MAX_INPUT_BYTES),
            }
        }
    }

    fn env_or<T>(key: &str, default: T) -> T
    where
        T: std::str::FromStr + PartialEq + Default,
    {
        match std::env::var(key) {
            Ok(v) => v
                .parse::<T>()
                .ok()
                .filter(|v| *v != T::default())
                .unwrap_or(default),
            Err(_) => default,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn invalid_or_zero_env_values_fall_back() {
            std::env::set_var("WARDC_TEST_LIMIT_A", "0");
            std::env::set_var("WARDC_TEST_LIMIT_B", "abc");
            std::env::set_var("WARDC_TEST_LIMIT_C", "17");
            assert_eq!(env_or("WARDC_TEST_LIMIT_A", 5u32), 5);
            assert_eq!(env_or("WARDC_TEST_LIMIT_B", 5u32), 5);
            assert_eq!(env_or("WARDC_TEST_LIMIT_C", 5u32), 17);
            assert_eq!(env_or("WARDC_TEST_LIMIT_UNSET", 5usize), 5);
        }
    }
}
