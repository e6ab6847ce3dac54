mod party_reaper;

pub use party_reaper::PartyReaper;
