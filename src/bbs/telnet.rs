//! Minimal telnet handling: option negotiation bytes, IAC stripping and
//! incremental UTF-8 decoding of the remaining data stream.

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const SE: u8 = 240;

pub const OPT_ECHO: u8 = 1;
pub const OPT_SUPPRESS_GO_AHEAD: u8 = 3;

/// Sent on connect: the server echoes and runs in character mode.
pub fn negotiation() -> [u8; 6] {
    [IAC, WILL, OPT_ECHO, IAC, WILL, OPT_SUPPRESS_GO_AHEAD]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum State {
    #[default]
    Data,
    Iac,
    Option,
    Subneg,
    SubnegIac,
}

/// Removes telnet commands from the byte stream. State survives between reads
/// so a sequence split across packets is still recognised.
#[derive(Debug, Default)]
pub struct TelnetFilter {
    state: State,
}

impl TelnetFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&mut self, input: &[u8], out: &mut Vec<u8>) {
        for &b in input {
            self.state = match (self.state, b) {
                (State::Data, IAC) => State::Iac,
                (State::Data, _) => {
                    out.push(b);
                    State::Data
                }
                (State::Iac, IAC) => {
                    out.push(IAC);
                    State::Data
                }
                (State::Iac, WILL | WONT | DO | DONT) => State::Option,
                (State::Iac, SB) => State::Subneg,
                (State::Iac, _) | (State::Option, _) => State::Data,
                (State::Subneg, IAC) => State::SubnegIac,
                (State::Subneg, _) => State::Subneg,
                (State::SubnegIac, SE) => State::Data,
                (State::SubnegIac, _) => State::Subneg,
            };
        }
    }
}

/// Turns bytes into characters, holding back an incomplete trailing sequence.
/// Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded characters paired with a flag telling whether each one was
    /// multi-byte.
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<(char, bool)> {
        self.pending.extend_from_slice(bytes);
        let mut chars = Vec::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    chars.extend(text.chars().map(|c| (c, c.len_utf8() > 1)));
                    self.pending.clear();
                    return chars;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&self.pending[..valid]) {
                        chars.extend(text.chars().map(|c| (c, c.len_utf8() > 1)));
                    }
                    match e.error_len() {
                        Some(bad) => {
                            chars.push((char::REPLACEMENT_CHARACTER, true));
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return chars;
                        }
                    }
                }
            }
        }
    }
}
