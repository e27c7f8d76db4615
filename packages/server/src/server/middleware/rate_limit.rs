// Rate limiting middleware using tower-governor
//
// Configuration:
// - Auth endpoints: 1 request per second per IP with burst of 5
// - Bounds how fast an attacker can burn initiate/respond rounds; the
//   attempt budget inside the session state machine is the real cap on
//   guesses per code
//
// Applied in app.rs as a layer on the /auth routes, gated by
// RATE_LIMIT_ENABLED so the test harness (no peer socket, no proxy headers)
// can switch it off.
