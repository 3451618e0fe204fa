//! Prints the in-memory byte layout of a sample integer and float.

fn main() {
    let sample_int: i32 = 0x12131415;
    let sample_float: f32 = 34.73;

    println!("Printing bytes for integer {sample_int:#010x}...");
    for (i, byte) in sample_int.to_le_bytes().iter().enumerate() {
        println!("Byte {}: {byte:#04X}", i + 1);
    }

    println!();
    println!("Printing bytes for float {sample_float}...");
    for (i, byte) in sample_float.to_le_bytes().iter().enumerate() {
        println!("Byte {}: {byte:#04X}", i + 1);
    }
}
