mod wrapper_lifecycle;
