mod driver;
mod runtime;
mod test_helpers;
