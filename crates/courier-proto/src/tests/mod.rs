mod schema_tests;
mod stream_tests;
