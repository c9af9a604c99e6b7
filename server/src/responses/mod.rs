mod stream;

pub use stream::StreamResponse;
