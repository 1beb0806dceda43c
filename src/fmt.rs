//! Logging shims. Each macro forwards to `defmt` and/or stdout depending on the enabled features
//! and compiles to nothing otherwise, so call sites never need their own `#[cfg]`.
#![allow(unused_macros)]

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::trace!($s $(, $x)*);
        #[cfg(feature = "debug-logs")]
        ::std::println!(concat!("TRACE ", $s) $(, $x)*);
        #[cfg(not(any(feature = "defmt", feature = "debug-logs")))]
        let _ = ($(&$x),*);
    }};
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::debug!($s $(, $x)*);
        #[cfg(feature = "debug-logs")]
        ::std::println!(concat!("DEBUG ", $s) $(, $x)*);
        #[cfg(not(any(feature = "defmt", feature = "debug-logs")))]
        let _ = ($(&$x),*);
    }};
}

macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::info!($s $(, $x)*);
        #[cfg(feature = "debug-logs")]
        ::std::println!(concat!("INFO  ", $s) $(, $x)*);
        #[cfg(not(any(feature = "defmt", feature = "debug-logs")))]
        let _ = ($(&$x),*);
    }};
}

macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::warn!($s $(, $x)*);
        #[cfg(feature = "debug-logs")]
        ::std::println!(concat!("WARN  ", $s) $(, $x)*);
        #[cfg(not(any(feature = "defmt", feature = "debug-logs")))]
        let _ = ($(&$x),*);
    }};
}

macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::error!($s $(, $x)*);
        #[cfg(feature = "debug-logs")]
        ::std::println!(concat!("ERROR ", $s) $(, $x)*);
        #[cfg(not(any(feature = "defmt", feature = "debug-logs")))]
        let _ = ($(&$x),*);
    }};
}
