/// HTTP protocol: [`RestRequest`](http::rest::RestRequest) endpoint
/// definitions, [`RequestSigner`](http::private::RequestSigner)
/// implementations and the [`RestClient`](http::RestClient).
pub mod http;
