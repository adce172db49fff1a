// Test modules for Kida
// Each module covers the corresponding source module

mod connectivity_tests;
