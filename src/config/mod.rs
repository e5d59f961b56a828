pub mod packet;
pub mod profile;

pub use packet::{ConfigPacket, PacketError, PACKET_SIZE};
pub use profile::{ConfigError, ConfigurationProfile, ProductType};
