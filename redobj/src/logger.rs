use chrono::Local;
use std::fmt;

fn emit(level: &str, args: fmt::Arguments) {
    let now = Local::now();
    eprintln!("{} {} redobj: {}", now.format("%Y-%m-%dT%H:%M:%S%.3f"), level, args);
}

pub fn info(args: fmt::Arguments) {
    emit("INFO", args);
}

pub fn warn(args: fmt::Arguments) {
    emit("WARN", args);
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::logger::info(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::logger::warn(format_args!($($arg)*))
    };
}
