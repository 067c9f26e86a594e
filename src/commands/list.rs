//! List commands implementation

use rservo_interfaces::available_interfaces;

/// List all supported interface adapters
pub fn list_interfaces() {
    println!("Supported interfaces:");
    println!();
    for info in available_interfaces() {
        let name = if info.aliases.is_empty() {
            info.name.to_string()
        } else {
            format!("{} ({})", info.name, info.aliases.join(", "))
        };
        println!("  {:<40} - {}", name, info.description);
    }
}
