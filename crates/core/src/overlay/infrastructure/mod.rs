pub mod raster_surface;
