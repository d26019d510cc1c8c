//! Integration tests for cloudmirror-graph
//!
//! Uses wiremock to simulate the Microsoft Graph API and verifies the
//! backend adapter's requests, status mapping and session handling, then
//! drives the transfer engine end to end over it.


mod test_engine;
