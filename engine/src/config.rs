pub use payloads::requests::AuctionConfig;
