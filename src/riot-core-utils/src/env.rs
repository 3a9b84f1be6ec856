//! Reading configuration values from the build environment.
//!
//! The macros are evaluated in `const` context, so the resulting values can be
//! used as array lengths and const generic arguments.

pub use {const_panic, konst};

macro_rules! define_env_with_default_macro {
    ($macro_name:ident, $parse_fn_name:ident, $output_type_name:literal) => {
        /// Reads a compile-time environment variable, falling back to a default.
        ///
        /// Fails the build if the variable is set but cannot be parsed.
        #[macro_export]
        macro_rules! $macro_name {
            ($env_var:literal, $default:expr) => {
                if let Some(str_value) = option_env!($env_var) {
                    if let Ok(value) = $crate::env::konst::primitive::$parse_fn_name(str_value) {
                        value
                    } else {
                        $crate::env::const_panic::concat_panic!(
                            "Could not parse environment variable `",
                            $env_var,
                            "=",
                            str_value,
                            "` as ",
                            $output_type_name,
                        );
                    }
                } else {
                    $default
                }
            };
        }
    };
}

define_env_with_default_macro!(usize_from_env_or, parse_usize, "a usize");
define_env_with_default_macro!(u8_from_env_or, parse_u8, "a u8");
